//! Async prover service
//!
//! Proving is CPU-bound, so it runs on dedicated worker threads rather than
//! the tokio runtime. Requests are dealt round-robin over per-worker
//! channels; each answer comes back on a oneshot. A panicking prover fails
//! the request it was handling and the worker keeps serving.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use log::{debug, error, warn};
use shade_privacy::Field;
use tokio::sync::{mpsc, oneshot};

use super::{CircuitProver, OperationKind, ProofOutput, ProveJob};
use crate::error::{CoreError, Result};

const QUEUE_DEPTH: usize = 32;

enum WorkerRequest {
    Prove {
        job: ProveJob,
        reply: oneshot::Sender<Result<ProofOutput>>,
    },
    Verify {
        kind: OperationKind,
        verification_key: Vec<u8>,
        public_signals: Vec<Field>,
        proof: Vec<u8>,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// Pool of proving threads
pub struct ProverService {
    workers: Vec<mpsc::Sender<WorkerRequest>>,
    next: AtomicUsize,
}

impl ProverService {
    /// Start `workers` proving threads sharing one prover implementation
    pub fn start<P: CircuitProver + 'static>(prover: P, workers: usize) -> Result<Self> {
        let prover: Arc<dyn CircuitProver> = Arc::new(prover);
        let mut senders = Vec::with_capacity(workers.max(1));

        for id in 0..workers.max(1) {
            let (request_tx, mut request_rx) = mpsc::channel::<WorkerRequest>(QUEUE_DEPTH);
            let prover = Arc::clone(&prover);

            thread::Builder::new()
                .name(format!("shade-prover-{id}"))
                .spawn(move || {
                    while let Some(request) = request_rx.blocking_recv() {
                        match request {
                            WorkerRequest::Prove { job, reply } => {
                                debug!("worker {} proving {}", id, job.kind);
                                let started = std::time::Instant::now();
                                let result = guarded(id, || prover.prove(&job)).map(|mut out| {
                                    if out.proving_time_ms == 0 {
                                        out.proving_time_ms = started.elapsed().as_millis() as u64;
                                    }
                                    out
                                });
                                let _ = reply.send(result);
                            }
                            WorkerRequest::Verify {
                                kind,
                                verification_key,
                                public_signals,
                                proof,
                                reply,
                            } => {
                                let _ = reply.send(guarded(id, || {
                                    prover.verify(kind, &verification_key, &public_signals, &proof)
                                }));
                            }
                        }
                    }
                    debug!("prover worker {} stopped", id);
                })
                .map_err(|e| CoreError::ProverUnavailable(format!("spawning worker: {e}")))?;

            senders.push(request_tx);
        }

        Ok(Self {
            workers: senders,
            next: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    async fn dispatch(&self, request: WorkerRequest) -> Result<()> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[slot].send(request).await.map_err(|_| {
            warn!("prover worker {} is gone", slot);
            CoreError::ProverUnavailable("prover service unavailable".to_string())
        })
    }

    /// Prove one job. Failures are returned as-is, never retried.
    pub async fn prove(&self, job: ProveJob) -> Result<ProofOutput> {
        let (reply, answer) = oneshot::channel();
        self.dispatch(WorkerRequest::Prove { job, reply }).await?;
        answer
            .await
            .map_err(|_| CoreError::ProverUnavailable("prover crashed".to_string()))?
    }

    /// Verify a proof against the circuit of `kind`.
    pub async fn verify(
        &self,
        kind: OperationKind,
        verification_key: Vec<u8>,
        public_signals: Vec<Field>,
        proof: Vec<u8>,
    ) -> Result<bool> {
        let (reply, answer) = oneshot::channel();
        self.dispatch(WorkerRequest::Verify {
            kind,
            verification_key,
            public_signals,
            proof,
            reply,
        })
        .await?;
        answer
            .await
            .map_err(|_| CoreError::ProverUnavailable("prover crashed".to_string()))?
    }
}

/// Run one prover call, turning a panic into `ProverUnavailable`.
fn guarded<T>(worker: usize, call: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("prover worker {} panicked: {}", worker, reason);
        Err(CoreError::ProverUnavailable(format!("prover panicked: {reason}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::{MockProver, Witness};

    fn job(v: u64) -> ProveJob {
        let mut witness = Witness::default();
        witness.scalar("x", Field::from_u64(v)).public("x");
        ProveJob {
            kind: OperationKind::Deposit,
            circuit: vec![],
            proving_key: vec![],
            witness,
        }
    }

    #[tokio::test]
    async fn test_parallel_proofs() {
        let service = ProverService::start(MockProver::new(), 3).unwrap();
        assert_eq!(service.workers(), 3);

        let outputs = futures::future::join_all((0..8).map(|v| service.prove(job(v)))).await;
        for (v, output) in outputs.into_iter().enumerate() {
            let output = output.unwrap();
            assert_eq!(output.public_signals, vec![Field::from_u64(v as u64)]);
            assert!(
                service
                    .verify(OperationKind::Deposit, vec![], output.public_signals, output.proof)
                    .await
                    .unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_prover_error_is_returned() {
        let service = ProverService::start(MockProver::new(), 1).unwrap();
        let mut bad = job(1);
        bad.witness.public("missing");
        assert!(matches!(
            service.prove(bad).await,
            Err(CoreError::EncodingMismatch(_))
        ));
    }

    /// Panics whenever the first public signal is 13.
    struct Unlucky(MockProver);

    impl CircuitProver for Unlucky {
        fn prove(&self, job: &ProveJob) -> Result<ProofOutput> {
            if job.witness.public_values()?.first() == Some(&Field::from_u64(13)) {
                panic!("unlucky witness");
            }
            self.0.prove(job)
        }

        fn verify(
            &self,
            kind: OperationKind,
            verification_key: &[u8],
            public_signals: &[Field],
            proof: &[u8],
        ) -> Result<bool> {
            self.0.verify(kind, verification_key, public_signals, proof)
        }
    }

    #[tokio::test]
    async fn test_worker_survives_prover_panic() {
        let service = ProverService::start(Unlucky(MockProver::new()), 1).unwrap();

        match service.prove(job(13)).await {
            Err(CoreError::ProverUnavailable(reason)) => assert!(reason.contains("unlucky witness")),
            other => panic!("expected ProverUnavailable, got {other:?}"),
        }

        // same single worker still answers
        let output = service.prove(job(14)).await.unwrap();
        assert_eq!(output.public_signals, vec![Field::from_u64(14)]);
    }

    #[tokio::test]
    async fn test_verify_checks_operation_kind() {
        let service = ProverService::start(MockProver::new(), 1).unwrap();
        let output = service.prove(job(5)).await.unwrap();

        assert!(
            !service
                .verify(OperationKind::Withdraw, vec![], output.public_signals, output.proof)
                .await
                .unwrap()
        );
    }
}
