use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};

use super::NullifierRecord;
use crate::error::{CoreError, Result};

const CF_NULLIFIERS: &str = "nullifiers";

/// Persistence for nullifier records, keyed by canonical hex.
pub trait NullifierStore: Send + Sync {
    fn get(&self, nullifier_hex: &str) -> Result<Option<NullifierRecord>>;

    fn put(&self, record: &NullifierRecord) -> Result<()>;

    /// Every stored record (for listing and resync)
    fn records(&self) -> Result<Vec<NullifierRecord>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryNullifierStore {
    records: DashMap<String, NullifierRecord>,
}

impl MemoryNullifierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NullifierStore for MemoryNullifierStore {
    fn get(&self, nullifier_hex: &str) -> Result<Option<NullifierRecord>> {
        Ok(self.records.get(nullifier_hex).map(|r| r.value().clone()))
    }

    fn put(&self, record: &NullifierRecord) -> Result<()> {
        self.records
            .insert(record.nullifier_hex.clone(), record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<NullifierRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

/// RocksDB-backed store; values are JSON.
#[derive(Clone)]
pub struct RocksNullifierStore {
    db: Arc<DB>,
}

impl RocksNullifierStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![ColumnFamilyDescriptor::new(CF_NULLIFIERS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_NULLIFIERS)
            .ok_or_else(|| CoreError::Storage("nullifiers CF missing".to_string()))
    }
}

impl NullifierStore for RocksNullifierStore {
    fn get(&self, nullifier_hex: &str) -> Result<Option<NullifierRecord>> {
        match self.db.get_cf(self.cf()?, nullifier_hex.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &NullifierRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.db
            .put_cf(self.cf()?, record.nullifier_hex.as_bytes(), value)?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<NullifierRecord>> {
        let mut records = Vec::new();
        for item in self.db.iterator_cf(self.cf()?, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(hex: &str, used: bool) -> NullifierRecord {
        NullifierRecord {
            nullifier_hex: hex.to_string(),
            used,
            spending_tx_ref: used.then(|| "tx".to_string()),
            spent_at: used.then_some(10),
            last_synced_at: 11,
        }
    }

    fn exercise(store: &dyn NullifierStore) {
        assert_eq!(store.get("0x01").unwrap(), None);

        store.put(&record("0x01", false)).unwrap();
        store.put(&record("0x02", true)).unwrap();
        assert_eq!(store.get("0x01").unwrap(), Some(record("0x01", false)));

        store.put(&record("0x01", true)).unwrap();
        assert!(store.get("0x01").unwrap().unwrap().used);
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn memory_store_get_put() {
        exercise(&MemoryNullifierStore::new());
    }

    #[test]
    fn rocks_store_get_put() {
        let dir = TempDir::new().unwrap();
        exercise(&RocksNullifierStore::open(dir.path()).unwrap());
    }

    #[test]
    fn rocks_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksNullifierStore::open(dir.path()).unwrap();
            store.put(&record("0xab", true)).unwrap();
        }
        let store = RocksNullifierStore::open(dir.path()).unwrap();
        assert_eq!(store.get("0xab").unwrap(), Some(record("0xab", true)));
    }
}
