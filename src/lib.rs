pub mod app;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{ControlPlanes, ResourceLookup, ServiceDispatcher};
pub use crypto::EncryptionKey;
pub use domain::{Catalog, PlanResolver, ResourceIdentity, ResourceRecord, ResourceState};
pub use error::{BrokerError, BrokerResult};
pub use infra::cloud::{ControlPlane, SimulatedControlPlane};
pub use storage::{MemoryRecordStore, RecordStore};
