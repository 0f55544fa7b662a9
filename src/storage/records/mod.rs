//! Persistence for [`ResourceRecord`]s.
//!
//! Records are never removed: deletion sets `deleted_at`, and only records without it are
//! "live". At most one live record may exist per external id.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PostgresRecordStore;

use crate::domain::record::ResourceRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A live record with this external id already exists.
    #[error("duplicate live record for {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned back into a record.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("record {0} does not exist")]
    Missing(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if a live record has the same external id.
    async fn insert(&self, record: &ResourceRecord) -> Result<(), StoreError>;

    async fn find_live(&self, external_id: &str) -> Result<Option<ResourceRecord>, StoreError>;

    /// Persists the mutable fields (state, endpoint, secret, tags, timestamps) by internal id.
    async fn update(&self, record: &ResourceRecord) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
