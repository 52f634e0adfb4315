//! In-memory [`FingerprintStore`] for tests and library callers without a database.
//!
//! A `BTreeMap` behind `std::sync::RwLock`, so enumeration is ordered like
//! the SQLite backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::FingerprintRecord;

use super::FingerprintStore;

#[derive(Default)]
pub struct InMemoryFingerprintStore {
    records: RwLock<BTreeMap<String, FingerprintRecord>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a snapshot of the durable store.
    pub fn from_records(records: impl IntoIterator<Item = FingerprintRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.local_id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory fingerprint store lock poisoned")
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, local_id: &str) -> Result<Option<FingerprintRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(local_id).cloned())
    }

    async fn put(&self, record: &FingerprintRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.local_id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, local_id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.remove(local_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FingerprintRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }

    async fn find_by_remote_id(&self, remote_file_id: &str) -> Result<Option<FingerprintRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .find(|r| r.remote_file_id.as_deref() == Some(remote_file_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncState;

    fn record(id: &str, remote: Option<&str>) -> FingerprintRecord {
        FingerprintRecord {
            local_id: id.to_string(),
            content_hash: format!("hash-{}", id),
            remote_file_id: remote.map(str::to_string),
            sync_state: SyncState::Synced,
            title: id.to_uppercase(),
            last_error: None,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn put_get_remove() {
        let store = InMemoryFingerprintStore::new();
        store.put(&record("a", Some("file-a"))).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().title, "A");

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_is_ordered_and_reverse_lookup_works() {
        let store = InMemoryFingerprintStore::from_records(vec![
            record("c", Some("file-c")),
            record("a", None),
            record("b", Some("file-b")),
        ]);
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.local_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let hit = store.find_by_remote_id("file-b").await.unwrap().unwrap();
        assert_eq!(hit.local_id, "b");
        assert!(store.find_by_remote_id("file-z").await.unwrap().is_none());
    }
}
