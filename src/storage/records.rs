//! Node record persistence using sled embedded database

use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::NodeId;
use crate::reputation::{NodeRecord, ReputationLedger};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Record key mismatch: stored under {key}, record names {record}")]
    KeyMismatch { key: String, record: NodeId },
}

/// Durable store of node records and stake balances
pub struct RecordStore {
    #[allow(dead_code)]
    db: Db,
    records: Tree,
}

impl RecordStore {
    /// Open or create a record store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let records = db.open_tree("node_records")?;
        Ok(Self { db, records })
    }

    /// Store a record, replacing any previous one for the node
    pub fn save(&self, record: &NodeRecord) -> Result<(), StoreError> {
        let value = bincode::serialize(record)?;
        self.records.insert(record.node_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    /// Load the record of a node
    pub fn load(&self, node: &NodeId) -> Result<Option<NodeRecord>, StoreError> {
        let Some(bytes) = self.records.get(node.as_str().as_bytes())? else {
            return Ok(None);
        };
        let record: NodeRecord = bincode::deserialize(&bytes)?;
        if record.node_id != *node {
            return Err(StoreError::KeyMismatch {
                key: node.to_string(),
                record: record.node_id,
            });
        }
        Ok(Some(record))
    }

    /// Load every stored record
    pub fn load_all(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.records.iter() {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Delete a node's record; returns whether one existed
    pub fn remove(&self, node: &NodeId) -> Result<bool, StoreError> {
        Ok(self.records.remove(node.as_str().as_bytes())?.is_some())
    }

    /// Get number of stored records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Write every record currently held by the ledger
    pub fn persist_ledger(&self, ledger: &ReputationLedger) -> Result<usize, StoreError> {
        let snapshot = ledger.snapshot();
        for record in &snapshot {
            self.save(record)?;
        }
        self.flush()?;
        info!("Persisted {} node records", snapshot.len());
        Ok(snapshot.len())
    }

    /// Load stored records into the ledger
    pub fn restore_ledger(&self, ledger: &ReputationLedger) -> Result<usize, StoreError> {
        let records = self.load_all()?;
        let count = records.len();
        ledger.restore(records);
        debug!("Restored {} node records", count);
        Ok(count)
    }

    /// Flush changes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.records.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reputation::ReputationConfig;
    use tempfile::tempdir;

    fn record(id: &str, score: f64, stake: f64) -> NodeRecord {
        NodeRecord {
            node_id: NodeId::from(id),
            score,
            last_update_ms: 1_000,
            stake,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        let r = record("node-a", 72.5, 90.0);
        store.save(&r).unwrap();

        assert_eq!(store.load(&NodeId::from("node-a")).unwrap(), Some(r));
        assert_eq!(store.load(&NodeId::from("node-b")).unwrap(), None);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        store.save(&record("node-a", 1.0, 1.0)).unwrap();
        assert!(store.remove(&NodeId::from("node-a")).unwrap());
        assert!(!store.remove(&NodeId::from("node-a")).unwrap());
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        let ledger = ReputationLedger::new(ReputationConfig::default());
        ledger.update(&NodeId::from("node-a"), false, 50.0);
        ledger.deposit_stake(&NodeId::from("node-b"), 25.0);

        {
            let store = RecordStore::open(dir.path()).unwrap();
            assert_eq!(store.persist_ledger(&ledger).unwrap(), 2);
        }

        let store = RecordStore::open(dir.path()).unwrap();
        let restored = ReputationLedger::new(ReputationConfig::default());
        assert_eq!(store.restore_ledger(&restored).unwrap(), 2);
        assert_eq!(restored.snapshot(), ledger.snapshot());
        assert_eq!(restored.stake(&NodeId::from("node-b")), 125.0);
    }
}
