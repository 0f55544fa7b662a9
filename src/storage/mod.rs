pub mod records;

pub use records::{MemoryRecordStore, PostgresRecordStore, RecordStore, StoreError};
