//! In-memory control plane for local runs and tests.
//!
//! Instances are created in status `creating` and stay there until [`SimulatedControlPlane::set_status`]
//! or [`SimulatedControlPlane::make_available`] moves them on, unless the plane was built with
//! [`SimulatedControlPlane::instant`].

use super::{CloudError, ControlPlane, CreateInstanceRequest, InstanceDescription, STATUS_AVAILABLE};
use crate::domain::engine::{EngineFamily, EngineType};
use crate::domain::record::Endpoint;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

pub const STATUS_CREATING: &str = "creating";

#[derive(Debug, Clone)]
struct SimulatedInstance {
    engine: EngineType,
    description: InstanceDescription,
}

#[derive(Debug, Default)]
pub struct SimulatedControlPlane {
    instances: RwLock<Vec<SimulatedInstance>>,
    requests: RwLock<Vec<CreateInstanceRequest>>,
    instant: bool,
    reject_creates: AtomicBool,
    reject_deletes: AtomicBool,
}

impl SimulatedControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances become available as soon as they are created.
    pub fn instant() -> Self {
        Self {
            instant: true,
            ..Self::default()
        }
    }

    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    pub fn reject_deletes(&self, reject: bool) {
        self.reject_deletes.store(reject, Ordering::SeqCst);
    }

    /// Sets the status of every instance named `identifier`. Endpoints are assigned when the
    /// status becomes `available`.
    pub async fn set_status(&self, identifier: &str, status: &str) {
        let mut instances = self.instances.write().await;
        for instance in instances
            .iter_mut()
            .filter(|i| i.description.identifier == identifier)
        {
            instance.description.status = status.to_string();
            if status == STATUS_AVAILABLE && instance.description.endpoint.is_none() {
                instance.description.endpoint = Some(simulated_endpoint(identifier, instance.engine));
            }
        }
    }

    pub async fn make_available(&self, identifier: &str) {
        self.set_status(identifier, STATUS_AVAILABLE).await;
    }

    /// Adds a raw description, e.g. to simulate a provider that reports duplicates.
    pub async fn inject(&self, engine: EngineType, description: InstanceDescription) {
        self.instances.write().await.push(SimulatedInstance {
            engine,
            description,
        });
    }

    pub async fn contains(&self, identifier: &str) -> bool {
        self.instances
            .read()
            .await
            .iter()
            .any(|i| i.description.identifier == identifier)
    }

    /// Create requests accepted so far, oldest first.
    pub async fn requests(&self) -> Vec<CreateInstanceRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ControlPlane for SimulatedControlPlane {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<(), CloudError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(CloudError::Rejected {
                operation: "create_instance",
                message: "simulated rejection".to_string(),
            });
        }

        let mut instances = self.instances.write().await;
        if instances
            .iter()
            .any(|i| i.description.identifier == request.identifier)
        {
            return Err(CloudError::Rejected {
                operation: "create_instance",
                message: format!("{} already exists", request.identifier),
            });
        }

        let description = if self.instant {
            InstanceDescription {
                identifier: request.identifier.clone(),
                status: STATUS_AVAILABLE.to_string(),
                endpoint: Some(simulated_endpoint(&request.identifier, request.engine)),
            }
        } else {
            InstanceDescription {
                identifier: request.identifier.clone(),
                status: STATUS_CREATING.to_string(),
                endpoint: None,
            }
        };
        instances.push(SimulatedInstance {
            engine: request.engine,
            description,
        });
        self.requests.write().await.push(request.clone());
        Ok(())
    }

    async fn describe_instance(
        &self,
        identifier: &str,
    ) -> Result<Vec<InstanceDescription>, CloudError> {
        Ok(self
            .instances
            .read()
            .await
            .iter()
            .filter(|i| i.description.identifier == identifier)
            .map(|i| i.description.clone())
            .collect())
    }

    async fn delete_instance(&self, identifier: &str) -> Result<(), CloudError> {
        if self.reject_deletes.load(Ordering::SeqCst) {
            return Err(CloudError::Rejected {
                operation: "delete_instance",
                message: "simulated rejection".to_string(),
            });
        }
        let mut instances = self.instances.write().await;
        let before = instances.len();
        instances.retain(|i| i.description.identifier != identifier);
        if instances.len() == before {
            return Err(CloudError::Rejected {
                operation: "delete_instance",
                message: format!("{identifier} not found"),
            });
        }
        Ok(())
    }
}

fn simulated_endpoint(identifier: &str, engine: EngineType) -> Endpoint {
    let port = match engine.family() {
        EngineFamily::Postgres => 5432,
        EngineFamily::MySql => 3306,
        EngineFamily::Oracle => 1521,
        EngineFamily::SqlServer => 1433,
        EngineFamily::Redis => 6379,
    };
    Endpoint {
        host: format!("{identifier}.simulated.internal"),
        port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(identifier: &str) -> CreateInstanceRequest {
        CreateInstanceRequest {
            identifier: identifier.into(),
            engine: EngineType::Postgres,
            engine_version: None,
            instance_class: "db.t3.micro".into(),
            allocated_storage: 10,
            database_name: Some(identifier.into()),
            master_username: "uabc".into(),
            master_password: "secret".into(),
            redundant: false,
            encrypted: true,
            subnet_group: None,
            security_group: None,
            tags: BTreeMap::new(),
            description: "test".into(),
            cache: None,
        }
    }

    #[tokio::test]
    async fn instances_start_creating_and_become_available() {
        let plane = SimulatedControlPlane::new();
        plane.create_instance(&request("dbone")).await.unwrap();

        let described = plane.describe_instance("dbone").await.unwrap();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].status, STATUS_CREATING);
        assert!(described[0].endpoint.is_none());

        plane.make_available("dbone").await;
        let described = plane.describe_instance("dbone").await.unwrap();
        assert!(described[0].is_available());
        assert_eq!(described[0].endpoint.as_ref().unwrap().port, 5432);
    }

    #[tokio::test]
    async fn missing_instances_describe_as_empty() {
        let plane = SimulatedControlPlane::new();
        assert!(plane.describe_instance("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_switches_apply() {
        let plane = SimulatedControlPlane::instant();
        plane.reject_creates(true);
        assert!(plane.create_instance(&request("dbone")).await.is_err());
        plane.reject_creates(false);
        plane.create_instance(&request("dbone")).await.unwrap();

        plane.reject_deletes(true);
        assert!(plane.delete_instance("dbone").await.is_err());
        assert!(plane.contains("dbone").await);
        plane.reject_deletes(false);
        plane.delete_instance("dbone").await.unwrap();
        assert!(!plane.contains("dbone").await);
    }
}
