//! Proving coordinator client
//!
//! ```text
//!   POST {coordinator}/v1/prove   {kind, circuit, proving_key, witness}
//!        -> {proof, public_signals, proving_time_ms}
//!   POST {coordinator}/v1/verify  {kind, verification_key, public_signals, proof}
//!        -> {valid}
//! ```
//!
//! Runs on prover worker threads, so it uses the blocking client.

use std::sync::OnceLock;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use shade_config::ProverConfig;
use shade_privacy::Field;

use super::artifacts::decode_public_signals;
use super::{CircuitProver, OperationKind, ProofOutput, ProveJob, Witness};
use crate::error::{CoreError, Result};
use crate::ledger::ApiResponse;

const DEFAULT_COORDINATOR_URL: &str = "http://localhost:8090";

/// Configuration for the coordinator client
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Base URL of the prover coordinator
    pub coordinator_url: String,
    /// Timeout for one proof (default: 5 minutes)
    pub proof_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            coordinator_url: DEFAULT_COORDINATOR_URL.to_string(),
            proof_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&ProverConfig> for CoordinatorConfig {
    fn from(config: &ProverConfig) -> Self {
        Self {
            coordinator_url: config
                .coordinator_url
                .clone()
                .unwrap_or_else(|| DEFAULT_COORDINATOR_URL.to_string()),
            proof_timeout: Duration::from_secs(config.proof_timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProveRequest<'a> {
    kind: OperationKind,
    circuit: String,
    proving_key: String,
    witness: &'a Witness,
}

#[derive(Debug, Deserialize)]
struct ProveResponse {
    proof: String,
    public_signals: Vec<String>,
    #[serde(default)]
    proving_time_ms: u64,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    kind: OperationKind,
    verification_key: String,
    public_signals: &'a [Field],
    proof: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

/// Prover backed by an external proving coordinator
pub struct CoordinatorProver {
    config: CoordinatorConfig,
    /// Built on first use, on the worker thread
    client: OnceLock<reqwest::blocking::Client>,
}

impl CoordinatorProver {
    pub fn new(mut config: CoordinatorConfig) -> Self {
        config.coordinator_url = config.coordinator_url.trim_end_matches('/').to_string();
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.proof_timeout)
            .build()
            .map_err(|e| CoreError::ProverUnavailable(format!("http client: {e}")))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn post<B: Serialize, T: serde::de::DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.config.coordinator_url, path);
        let response = self
            .client()?
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| CoreError::ProverUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CoreError::ProverUnavailable(format!(
                "coordinator returned {status}: {body}"
            )));
        }

        let api: ApiResponse<T> = response
            .json()
            .map_err(|e| CoreError::ProverUnavailable(format!("unreadable coordinator reply: {e}")))?;
        api.into_result()
            .map_err(|message| CoreError::ProverUnavailable(format!("coordinator error {message}")))
    }
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| CoreError::EncodingMismatch(format!("{what}: {e}")))
}

impl CircuitProver for CoordinatorProver {
    fn prove(&self, job: &ProveJob) -> Result<ProofOutput> {
        info!("submitting {} proof to coordinator", job.kind);
        let response: ProveResponse = self.post(
            "/v1/prove",
            &ProveRequest {
                kind: job.kind,
                circuit: hex::encode(&job.circuit),
                proving_key: hex::encode(&job.proving_key),
                witness: &job.witness,
            },
        )?;

        Ok(ProofOutput {
            proof: decode_hex("proof", &response.proof)?,
            public_signals: decode_public_signals(&response.public_signals)?,
            proving_time_ms: response.proving_time_ms,
        })
    }

    fn verify(
        &self,
        kind: OperationKind,
        verification_key: &[u8],
        public_signals: &[Field],
        proof: &[u8],
    ) -> Result<bool> {
        let response: VerifyResponse = self.post(
            "/v1/verify",
            &VerifyRequest {
                kind,
                verification_key: hex::encode(verification_key),
                public_signals,
                proof: hex::encode(proof),
            },
        )?;
        Ok(response.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_prover_config() {
        let prover = ProverConfig {
            coordinator_url: Some("http://prover:9000/".to_string()),
            proof_timeout_secs: 5,
            ..ProverConfig::default()
        };
        let client = CoordinatorProver::new(CoordinatorConfig::from(&prover));
        assert_eq!(client.config.coordinator_url, "http://prover:9000");
        assert_eq!(client.config.proof_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unreachable_coordinator() {
        let client = CoordinatorProver::new(CoordinatorConfig {
            coordinator_url: "http://127.0.0.1:9".to_string(),
            proof_timeout: Duration::from_millis(500),
        });
        let job = ProveJob {
            kind: OperationKind::Deposit,
            circuit: vec![],
            proving_key: vec![],
            witness: Witness::default(),
        };
        assert!(matches!(client.prove(&job), Err(CoreError::ProverUnavailable(_))));
    }

    #[test]
    fn test_request_shape() {
        let mut witness = Witness::default();
        witness.scalar("a", Field::ONE).public("a");
        let request = ProveRequest {
            kind: OperationKind::Transfer,
            circuit: hex::encode(b"c"),
            proving_key: hex::encode(b"k"),
            witness: &witness,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "transfer");
        assert_eq!(json["circuit"], "63");
        assert_eq!(json["witness"]["inputs"]["a"], Field::ONE.to_hex());
        assert_eq!(json["witness"]["public"][0], "a");

        let signals = [Field::ONE];
        let request = VerifyRequest {
            kind: OperationKind::Withdraw,
            verification_key: hex::encode(b"v"),
            public_signals: &signals,
            proof: hex::encode(b"p"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "withdraw");
        assert_eq!(json["public_signals"][0], Field::ONE.to_hex());
    }
}
