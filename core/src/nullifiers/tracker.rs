use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use shade_config::NullifierConfig;
use shade_privacy::{Nullifier, normalize_hex};

use super::{CheckMode, NullifierRecord, NullifierStore, SpentStatus};
use crate::error::{CoreError, Result};
use crate::ledger::NullifierLedger;
use crate::unix_now;

/// Batching knobs for [`NullifierTracker::sync_batch`].
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&NullifierConfig::default())
    }
}

impl From<&NullifierConfig> for TrackerConfig {
    fn from(config: &NullifierConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
        }
    }
}

/// Per-chunk result of a batch sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch: usize,
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub batches: Vec<BatchOutcome>,
}

/// Cache-first nullifier tracker backed by a ledger.
pub struct NullifierTracker<Q> {
    ledger: Q,
    store: Arc<dyn NullifierStore>,
    config: TrackerConfig,
    /// Serializes read-check-write so `used` never flips back
    write_lock: Mutex<()>,
}

impl<Q: NullifierLedger> NullifierTracker<Q> {
    pub fn new(ledger: Q, store: Arc<dyn NullifierStore>, config: TrackerConfig) -> Self {
        Self {
            ledger,
            store,
            config: TrackerConfig {
                batch_size: config.batch_size.max(1),
                ..config
            },
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn NullifierStore> {
        &self.store
    }

    /// Cached record for a nullifier, if any.
    pub fn cached(&self, nullifier_hex: &str) -> Result<Option<NullifierRecord>> {
        self.store.get(&normalize_hex(nullifier_hex)?)
    }

    /// Whether the nullifier is spent.
    ///
    /// A cached `Used` is final. Otherwise, with `check_external`, the ledger
    /// is asked and the answer written back. Without it a miss is treated as
    /// unused. An unreachable ledger with nothing cached is an error, never
    /// "unused".
    pub async fn is_spent(&self, nullifier_hex: &str, check_external: bool) -> Result<bool> {
        match self.status(nullifier_hex, check_external.into()).await? {
            SpentStatus::Used => Ok(true),
            SpentStatus::Unused => Ok(false),
            SpentStatus::Unknown => Err(CoreError::ExternalUnavailable(format!(
                "cannot determine status of nullifier {nullifier_hex}"
            ))),
        }
    }

    /// Lifecycle state of a nullifier, exposing `Unknown`.
    pub async fn status(&self, nullifier_hex: &str, mode: CheckMode) -> Result<SpentStatus> {
        let key = normalize_hex(nullifier_hex)?;
        let cached = self.store.get(&key)?;

        if cached.as_ref().is_some_and(|r| r.used) {
            return Ok(SpentStatus::Used);
        }
        if mode == CheckMode::CacheOnly {
            return Ok(SpentStatus::Unused);
        }

        match self.fetch(&key).await {
            Ok(record) => {
                let applied = self.apply(record)?;
                Ok(if applied.used {
                    SpentStatus::Used
                } else {
                    SpentStatus::Unused
                })
            }
            Err(e) => {
                warn!("nullifier {} lookup failed: {}", key, e);
                Ok(match cached {
                    Some(_) => SpentStatus::Unused,
                    None => SpentStatus::Unknown,
                })
            }
        }
    }

    /// Forced ledger lookup with write-back. True iff the record was
    /// reachable, decodable and applied.
    pub async fn sync_one(&self, nullifier_hex: &str) -> bool {
        let key = match normalize_hex(nullifier_hex) {
            Ok(key) => key,
            Err(e) => {
                warn!("skipping undecodable nullifier {:?}: {}", nullifier_hex, e);
                return false;
            }
        };

        let record = match self.fetch(&key).await {
            Ok(record) => record,
            Err(e) => {
                warn!("sync of nullifier {} failed: {}", key, e);
                return false;
            }
        };

        match self.apply(record) {
            Ok(applied) => {
                debug!("synced nullifier {} (used={})", key, applied.used);
                true
            }
            Err(e) => {
                warn!("could not apply nullifier {}: {}", key, e);
                false
            }
        }
    }

    /// Sync many nullifiers in chunks of `batch_size`, concurrently within a
    /// chunk, pausing `batch_delay` between chunks. Failures are counted, not
    /// propagated.
    pub async fn sync_batch<S>(&self, nullifier_hexes: &[S]) -> SyncReport
    where
        S: AsRef<str> + Sync,
    {
        let mut report = SyncReport::default();

        for (batch, chunk) in nullifier_hexes.chunks(self.config.batch_size).enumerate() {
            if batch > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let outcomes = join_all(chunk.iter().map(|hex| self.sync_one(hex.as_ref()))).await;
            let synced = outcomes.iter().filter(|ok| **ok).count();
            let failed = chunk.len() - synced;

            debug!("sync batch {}: {} synced, {} failed", batch, synced, failed);
            report.synced += synced;
            report.failed += failed;
            report.batches.push(BatchOutcome {
                batch,
                synced,
                failed,
            });
        }

        info!(
            "nullifier sync finished: {} synced, {} failed in {} batches",
            report.synced,
            report.failed,
            report.batches.len()
        );
        report
    }

    /// Record a confirmed spend. Idempotent; the first transaction reference
    /// is kept.
    pub fn mark_spent(&self, nullifier_hex: &str, tx_ref: Option<&str>) -> Result<NullifierRecord> {
        let now = unix_now();
        let record = self.apply(NullifierRecord {
            nullifier_hex: normalize_hex(nullifier_hex)?,
            used: true,
            spending_tx_ref: tx_ref.map(str::to_string),
            spent_at: Some(now),
            last_synced_at: now,
        })?;
        info!("nullifier {} marked spent", record.nullifier_hex);
        Ok(record)
    }

    /// Merge a record into the cache. `used` only moves false to true.
    pub fn apply(&self, record: NullifierRecord) -> Result<NullifierRecord> {
        let key = normalize_hex(&record.nullifier_hex)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let merged = match self.store.get(&key)? {
            Some(existing) if existing.used && !record.used => {
                error!("refusing to downgrade spent nullifier {}", key);
                return Err(CoreError::NullifierDowngrade(key));
            }
            Some(existing) if existing.used => NullifierRecord {
                nullifier_hex: key,
                used: true,
                spending_tx_ref: existing.spending_tx_ref.or(record.spending_tx_ref),
                spent_at: existing.spent_at.or(record.spent_at),
                last_synced_at: existing.last_synced_at.max(record.last_synced_at),
            },
            _ => NullifierRecord {
                nullifier_hex: key,
                ..record
            },
        };

        self.store.put(&merged)?;
        Ok(merged)
    }

    async fn fetch(&self, key: &str) -> Result<NullifierRecord> {
        let nullifier = Nullifier::from_hex(key)?;
        let external = self.ledger.query_nullifier_record(&nullifier).await?;
        let now = unix_now();

        Ok(match external {
            Some(ext) => NullifierRecord {
                nullifier_hex: key.to_string(),
                used: ext.used,
                spent_at: if ext.used { ext.spent_at.or(Some(now)) } else { None },
                spending_tx_ref: ext.tx_ref,
                last_synced_at: now,
            },
            None => NullifierRecord {
                nullifier_hex: key.to_string(),
                used: false,
                spending_tx_ref: None,
                spent_at: None,
                last_synced_at: now,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::nullifiers::MemoryNullifierStore;
    use shade_privacy::Field;

    fn tracker(ledger: Arc<InMemoryLedger>) -> NullifierTracker<Arc<InMemoryLedger>> {
        NullifierTracker::new(
            ledger,
            Arc::new(MemoryNullifierStore::new()),
            TrackerConfig {
                batch_size: 2,
                batch_delay: Duration::from_millis(1),
            },
        )
    }

    fn ledger() -> Arc<InMemoryLedger> {
        Arc::new(InMemoryLedger::new(4, 8).unwrap())
    }

    fn nf(v: u64) -> Nullifier {
        Nullifier(Field::from_u64(v))
    }

    #[tokio::test]
    async fn test_miss_without_external_is_unused() {
        let ledger = ledger();
        ledger.record_external_spend(nf(1), "tx1");
        let tracker = tracker(ledger);

        assert!(!tracker.is_spent(&nf(1).to_hex(), false).await.unwrap());
        assert!(tracker.is_spent(&nf(1).to_hex(), true).await.unwrap());
        assert!(tracker.is_spent(&nf(1).to_hex(), false).await.unwrap(), "written back");
    }

    #[tokio::test]
    async fn test_cached_used_is_final() {
        let ledger = ledger();
        let tracker = tracker(Arc::clone(&ledger));
        tracker.mark_spent(&nf(2).to_hex(), Some("tx2")).unwrap();

        ledger.set_available(false);
        assert!(tracker.is_spent(&nf(2).to_hex(), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_unknown_not_unused() {
        let ledger = ledger();
        ledger.set_available(false);
        let tracker = tracker(ledger);

        let status = tracker.status(&nf(3).to_hex(), CheckMode::CheckExternal).await.unwrap();
        assert_eq!(status, SpentStatus::Unknown);
        assert!(matches!(
            tracker.is_spent(&nf(3).to_hex(), true).await.unwrap_err(),
            CoreError::ExternalUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_cached_unused_is_rechecked() {
        let ledger = ledger();
        let tracker = tracker(Arc::clone(&ledger));
        assert!(!tracker.is_spent(&nf(4).to_hex(), true).await.unwrap());

        ledger.record_external_spend(nf(4), "elsewhere");
        assert!(tracker.is_spent(&nf(4).to_hex(), true).await.unwrap());
        let cached = tracker.cached(&nf(4).to_hex()).unwrap().unwrap();
        assert_eq!(cached.spending_tx_ref.as_deref(), Some("elsewhere"));
    }

    #[tokio::test]
    async fn test_downgrade_rejected() {
        let tracker = tracker(ledger());
        tracker.mark_spent(&nf(5).to_hex(), None).unwrap();

        let err = tracker
            .apply(NullifierRecord {
                nullifier_hex: nf(5).to_hex(),
                used: false,
                spending_tx_ref: None,
                spent_at: None,
                last_synced_at: 0,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::NullifierDowngrade(_)));
        assert!(!tracker.sync_one(&nf(5).to_hex()).await, "ledger disagrees, sync refused");
        assert!(tracker.cached(&nf(5).to_hex()).unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_mark_spent_is_idempotent() {
        let tracker = tracker(ledger());
        let first = tracker.mark_spent(&nf(6).to_hex(), Some("a")).unwrap();
        let second = tracker.mark_spent(&nf(6).to_hex(), Some("b")).unwrap();
        assert_eq!(second.spending_tx_ref.as_deref(), Some("a"));
        assert_eq!(first.spent_at, second.spent_at);
    }

    #[tokio::test]
    async fn test_keys_are_normalized() {
        let tracker = tracker(ledger());
        tracker.mark_spent("0xAB", None).unwrap();
        assert!(tracker.is_spent(&nf(0xab).to_hex(), false).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_batch_reports_partial_failure() {
        let ledger = ledger();
        ledger.record_external_spend(nf(7), "tx7");
        let tracker = tracker(ledger);

        let hexes = vec![nf(7).to_hex(), "not-hex".to_string(), nf(8).to_hex()];
        let report = tracker.sync_batch(&hexes).await;

        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.batches,
            vec![
                BatchOutcome { batch: 0, synced: 1, failed: 1 },
                BatchOutcome { batch: 1, synced: 1, failed: 0 },
            ]
        );
        assert!(tracker.is_spent(&nf(7).to_hex(), false).await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_one_unreachable() {
        let ledger = ledger();
        ledger.set_available(false);
        let tracker = tracker(ledger);
        assert!(!tracker.sync_one(&nf(9).to_hex()).await);
        assert_eq!(tracker.cached(&nf(9).to_hex()).unwrap(), None);
    }
}
