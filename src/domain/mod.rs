pub mod adapter;
pub mod catalog;
pub mod engine;
pub mod record;

pub use adapter::ProvisioningAdapter;
pub use catalog::{Catalog, PlanDescriptor, PlanResolver, ServiceFamily, SharedBacking};
pub use engine::EngineType;
pub use record::{AdapterKind, Credentials, Endpoint, ResourceIdentity, ResourceRecord, ResourceState};
