//! HTTP ledger client
//!
//! ```text
//!   GET  {authority}/v1/accumulator[?index=N]  -> AccumulatorSnapshotResponse
//!   POST {authority}/v1/operations              -> SubmissionReceipt
//!   GET  {query}/v1/nullifiers/{hex}            -> ExternalNullifierRecord | 404
//! ```
//!
//! Transport failures, timeouts and 5xx answers are retried with exponential
//! backoff. Anything the service actually answered is final.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shade_config::LedgerConfig;
use shade_privacy::Nullifier;

use super::{
    AccumulatorSnapshotResponse, ExternalNullifierRecord, LedgerAuthority, NullifierLedger,
    SubmissionReceipt,
};
use crate::error::{CoreError, Result};
use crate::prover::SubmissionPayload;

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        code: Option<String>,
    },
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { message, code } => Err(format!(
                "({}) {}",
                code.unwrap_or_else(|| "unknown".to_string()),
                message
            )),
        }
    }
}

enum Attempt {
    /// Worth retrying
    Transient(String),
    Fatal(CoreError),
}

/// JSON-over-HTTP ledger authority and nullifier query client
pub struct HttpLedgerClient {
    authority_url: String,
    query_url: String,
    client: reqwest::Client,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CoreError::ExternalUnavailable(format!("http client: {e}")))?;

        Ok(Self {
            authority_url: config.authority_url.trim_end_matches('/').to_string(),
            query_url: config.query_url().trim_end_matches('/').to_string(),
            client,
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    pub fn authority_url(&self) -> &str {
        &self.authority_url
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    /// Check if the ledger authority is healthy
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/v1/health", self.authority_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Ledger authority health check failed: {}", e);
                false
            }
        }
    }

    async fn send_with_retry<T, F>(&self, what: &str, build: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            match Self::send_once(build()).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Transient(reason)) if attempt < self.max_retries => {
                    let delay = self.retry_base.saturating_mul(2u32.saturating_pow(attempt));
                    warn!("{what} failed ({reason}), retry {} in {:?}", attempt + 1, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Transient(reason)) => {
                    return Err(CoreError::ExternalUnavailable(format!(
                        "{what}: {reason} after {} attempts",
                        attempt + 1
                    )));
                }
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        request: RequestBuilder,
    ) -> std::result::Result<Option<T>, Attempt> {
        let response = request
            .send()
            .await
            .map_err(|e| Attempt::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Transient(format!("status {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(CoreError::Rejected(format!("{status}: {body}"))));
        }

        let api: ApiResponse<T> = response.json().await.map_err(|e| {
            Attempt::Fatal(CoreError::EncodingMismatch(format!("ledger response: {e}")))
        })?;
        api.into_result()
            .map(Some)
            .map_err(|message| Attempt::Fatal(CoreError::Rejected(message)))
    }
}

impl LedgerAuthority for HttpLedgerClient {
    async fn fetch_snapshot(&self, index: Option<u64>) -> Result<AccumulatorSnapshotResponse> {
        let url = format!("{}/v1/accumulator", self.authority_url);
        let snapshot = self
            .send_with_retry("fetch accumulator snapshot", || {
                let request = self.client.get(&url);
                match index {
                    Some(i) => request.query(&[("index", i)]),
                    None => request,
                }
            })
            .await?;

        match snapshot {
            Some(s) => {
                debug!("ledger root {} next index {}", s.root, s.next_index);
                Ok(s)
            }
            None => Err(CoreError::Rejected(match index {
                Some(i) => format!("leaf {i} unknown to ledger authority"),
                None => "ledger authority has no accumulator".to_string(),
            })),
        }
    }

    async fn submit_operation(&self, payload: &SubmissionPayload) -> Result<SubmissionReceipt> {
        let url = format!("{}/v1/operations", self.authority_url);
        self.send_with_retry("submit operation", || self.client.post(&url).json(payload))
            .await?
            .ok_or_else(|| CoreError::Rejected("operations endpoint not found".to_string()))
    }
}

impl NullifierLedger for HttpLedgerClient {
    async fn query_nullifier_record(
        &self,
        nullifier: &Nullifier,
    ) -> Result<Option<ExternalNullifierRecord>> {
        let url = format!("{}/v1/nullifiers/{}", self.query_url, nullifier.to_hex());
        self.send_with_retry("query nullifier", || self.client.get(&url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_privacy::Field;

    fn unreachable_config() -> LedgerConfig {
        LedgerConfig {
            // Discard port, nothing listens there
            authority_url: "http://127.0.0.1:9/".to_string(),
            query_url: None,
            request_timeout_ms: 500,
            max_retries: 1,
            retry_base_ms: 1,
        }
    }

    #[test]
    fn test_urls_are_trimmed() {
        let client = HttpLedgerClient::new(&unreachable_config()).unwrap();
        assert_eq!(client.authority_url(), "http://127.0.0.1:9");
        assert_eq!(client.query_url(), "http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_unavailable() {
        let client = HttpLedgerClient::new(&unreachable_config()).unwrap();
        let err = client
            .query_nullifier_record(&Nullifier(Field::from_u64(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExternalUnavailable(_)), "got {err:?}");
    }

    #[test]
    fn test_api_response_decoding() {
        let ok: ApiResponse<ExternalNullifierRecord> =
            serde_json::from_str(r#"{"status":"success","data":{"used":true,"tx_ref":"abc"}}"#)
                .unwrap();
        let record = ok.into_result().unwrap();
        assert!(record.used);
        assert_eq!(record.spent_at, None);

        let err: ApiResponse<ExternalNullifierRecord> =
            serde_json::from_str(r#"{"status":"error","message":"boom","code":"E1"}"#).unwrap();
        assert_eq!(err.into_result().unwrap_err(), "(E1) boom");
    }
}
