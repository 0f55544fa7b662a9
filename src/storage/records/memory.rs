use super::{RecordStore, StoreError};
use crate::domain::record::ResourceRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store for tests and local runs. Uniqueness is checked under the write lock.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<Uuid, ResourceRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever stored, including soft-deleted ones.
    pub async fn all(&self) -> Vec<ResourceRecord> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records
            .values()
            .any(|r| r.is_live() && r.external_id == record.external_id)
        {
            return Err(StoreError::Duplicate(record.external_id.clone()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_live(&self, external_id: &str) -> Result<Option<ResourceRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.is_live() && r.external_id == external_id)
            .cloned())
    }

    async fn update(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(record.id.to_string())),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::EngineType;
    use crate::domain::record::tests::{identity, plan, test_key};
    use crate::domain::record::{AdapterKind, ResourceState};

    fn record(external_id: &str) -> ResourceRecord {
        ResourceRecord::provision(
            identity(external_id),
            &plan(EngineType::Postgres, AdapterKind::Dedicated),
            "db",
            &test_key(),
        )
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn live_external_ids_are_unique() {
        let store = MemoryRecordStore::new();
        store.insert(&record("a")).await.unwrap();
        assert!(matches!(
            store.insert(&record("a")).await,
            Err(StoreError::Duplicate(_))
        ));
        store.insert(&record("b")).await.unwrap();
        assert_eq!(store.all().await.len(), 2);
    }

    #[tokio::test]
    async fn soft_deleted_records_free_the_external_id() {
        let store = MemoryRecordStore::new();
        let mut first = record("a");
        store.insert(&first).await.unwrap();

        first.mark_deleted();
        store.update(&first).await.unwrap();
        assert!(store.find_live("a").await.unwrap().is_none());

        store.insert(&record("a")).await.unwrap();
        assert!(store.find_live("a").await.unwrap().is_some());
        assert_eq!(store.all().await.len(), 2);
    }

    #[tokio::test]
    async fn update_persists_state_changes() {
        let store = MemoryRecordStore::new();
        let mut rec = record("a");
        store.insert(&rec).await.unwrap();

        rec.set_state(ResourceState::NotGone);
        store.update(&rec).await.unwrap();
        let found = store.find_live("a").await.unwrap().unwrap();
        assert_eq!(found.state, ResourceState::NotGone);
    }

    #[tokio::test]
    async fn updating_an_unknown_record_fails() {
        let store = MemoryRecordStore::new();
        assert!(matches!(
            store.update(&record("a")).await,
            Err(StoreError::Missing(_))
        ));
    }
}
