//! Nullifier Tracking
//!
//! Local view of which nullifiers are spent, reconciled against the ledger.
//!
//! ```text
//!            ┌──────────┐  ledger says unused   ┌────────┐
//!            │ Unknown  │──────────────────────▶│ Unused │
//!            └──────────┘                       └────────┘
//!                 │   ledger says used / mark_spent   │
//!                 └──────────────┐   ┌────────────────┘
//!                                ▼   ▼
//!                              ┌────────┐
//!                              │  Used  │  (terminal)
//!                              └────────┘
//! ```
//!
//! `Unknown` is never persisted: it is what a lookup returns when the ledger
//! cannot be reached and nothing is cached.

mod store;
mod tracker;

use serde::{Deserialize, Serialize};

pub use store::{MemoryNullifierStore, NullifierStore, RocksNullifierStore};
pub use tracker::{BatchOutcome, NullifierTracker, SyncReport, TrackerConfig};

/// Cached state of one nullifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierRecord {
    /// Canonical `0x` hex, the cache key
    pub nullifier_hex: String,
    pub used: bool,
    #[serde(default)]
    pub spending_tx_ref: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub spent_at: Option<u64>,
    pub last_synced_at: u64,
}

/// Lifecycle state reported by [`NullifierTracker::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpentStatus {
    Unknown,
    Unused,
    Used,
}

/// Whether a lookup may consult the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    CacheOnly,
    CheckExternal,
}

impl From<bool> for CheckMode {
    fn from(check_external: bool) -> Self {
        if check_external {
            CheckMode::CheckExternal
        } else {
            CheckMode::CacheOnly
        }
    }
}
