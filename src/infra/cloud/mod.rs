//! Narrow interface to the cloud control plane that hosts dedicated resources.
//!
//! Three calls are enough for the whole lifecycle: create (asynchronous on the provider side),
//! describe by identifier and delete. Implementations: RDS for relational engines,
//! ElastiCache replication groups for caches, and an in-memory simulation.

pub mod elasticache;
pub mod rds;
pub mod simulated;

pub use elasticache::ElastiCacheControlPlane;
pub use rds::RdsControlPlane;
pub use simulated::SimulatedControlPlane;

use crate::domain::catalog::CacheOptions;
use crate::domain::engine::EngineType;
use crate::domain::record::Endpoint;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Status string the providers use for a resource that accepts connections.
pub const STATUS_AVAILABLE: &str = "available";

#[derive(Debug, Error)]
pub enum CloudError {
    /// The provider refused the call (quota, validation, conflicting state).
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// The call did not get an answer.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Everything the provider needs to create one dedicated instance or replication group.
#[derive(Clone)]
pub struct CreateInstanceRequest {
    pub identifier: String,
    pub engine: EngineType,
    pub engine_version: Option<String>,
    pub instance_class: String,
    pub allocated_storage: i32,
    /// Initial database; `None` for engines that do not take one.
    pub database_name: Option<String>,
    pub master_username: String,
    pub master_password: String,
    pub redundant: bool,
    pub encrypted: bool,
    pub subnet_group: Option<String>,
    pub security_group: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub description: String,
    pub cache: Option<CacheOptions>,
}

impl fmt::Debug for CreateInstanceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateInstanceRequest")
            .field("identifier", &self.identifier)
            .field("engine", &self.engine)
            .field("engine_version", &self.engine_version)
            .field("instance_class", &self.instance_class)
            .field("allocated_storage", &self.allocated_storage)
            .field("database_name", &self.database_name)
            .field("master_username", &self.master_username)
            .field("master_password", &"<redacted>")
            .field("redundant", &self.redundant)
            .field("encrypted", &self.encrypted)
            .field("subnet_group", &self.subnet_group)
            .field("security_group", &self.security_group)
            .field("tags", &self.tags)
            .field("cache", &self.cache)
            .finish()
    }
}

/// One resource as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    pub identifier: String,
    pub status: String,
    pub endpoint: Option<Endpoint>,
}

impl InstanceDescription {
    pub fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_AVAILABLE)
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<(), CloudError>;

    /// All resources matching `identifier`. A missing resource is an empty list, not an error.
    async fn describe_instance(&self, identifier: &str)
        -> Result<Vec<InstanceDescription>, CloudError>;

    /// Deletes without taking a final snapshot.
    async fn delete_instance(&self, identifier: &str) -> Result<(), CloudError>;
}

/// Loads the default AWS credential chain for `region`.
pub async fn load_sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// Provider port numbers arrive as `i32`; anything outside `u16` is not a usable endpoint.
pub(crate) fn endpoint_from(host: Option<&str>, port: Option<i32>) -> Option<Endpoint> {
    let host = host.filter(|h| !h.is_empty())?;
    let port = u16::try_from(port?).ok().filter(|p| *p != 0)?;
    Some(Endpoint {
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_requires_host_and_valid_port() {
        assert_eq!(
            endpoint_from(Some("db.example"), Some(5432)),
            Some(Endpoint {
                host: "db.example".into(),
                port: 5432
            })
        );
        assert_eq!(endpoint_from(None, Some(5432)), None);
        assert_eq!(endpoint_from(Some(""), Some(5432)), None);
        assert_eq!(endpoint_from(Some("db.example"), Some(-1)), None);
        assert_eq!(endpoint_from(Some("db.example"), None), None);
    }

    #[test]
    fn availability_ignores_case() {
        let desc = InstanceDescription {
            identifier: "x".into(),
            status: "Available".into(),
            endpoint: None,
        };
        assert!(desc.is_available());
    }

    #[test]
    fn request_debug_hides_the_master_password() {
        let request = CreateInstanceRequest {
            identifier: "dbabc".into(),
            engine: EngineType::Postgres,
            engine_version: None,
            instance_class: "db.t3.micro".into(),
            allocated_storage: 10,
            database_name: Some("dbabc".into()),
            master_username: "uabc".into(),
            master_password: "hunter2hunter2".into(),
            redundant: false,
            encrypted: true,
            subnet_group: None,
            security_group: None,
            tags: BTreeMap::new(),
            description: "test".into(),
            cache: None,
        };
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
