//! Routes requests to the broker of the service's family.

use crate::app::broker::{Broker, ResourceLookup};
use crate::crypto::EncryptionKey;
use crate::domain::catalog::{CatalogListing, PlanResolver, ServiceFamily};
use crate::domain::record::{Credentials, ResourceIdentity, ResourceState};
use crate::error::{BrokerError, BrokerResult};
use crate::infra::cloud::ControlPlane;
use crate::storage::records::RecordStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Control planes per family: relational instances and cache clusters may live in different
/// provider services.
#[derive(Clone)]
pub struct ControlPlanes {
    pub relational: Arc<dyn ControlPlane>,
    pub cache: Arc<dyn ControlPlane>,
}

impl ControlPlanes {
    /// One control plane for both families.
    pub fn single(plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            relational: plane.clone(),
            cache: plane,
        }
    }
}

pub struct ServiceDispatcher {
    resolver: Arc<PlanResolver>,
    store: Arc<dyn RecordStore>,
    brokers: HashMap<ServiceFamily, Broker>,
}

impl ServiceDispatcher {
    pub fn new(
        resolver: Arc<PlanResolver>,
        store: Arc<dyn RecordStore>,
        key: EncryptionKey,
        control_planes: ControlPlanes,
        db_prefix: &str,
    ) -> Self {
        let mut brokers = HashMap::new();
        for (family, plane) in [
            (ServiceFamily::Relational, control_planes.relational),
            (ServiceFamily::Cache, control_planes.cache),
        ] {
            brokers.insert(
                family,
                Broker::new(
                    family,
                    resolver.clone(),
                    store.clone(),
                    key.clone(),
                    plane,
                    db_prefix,
                ),
            );
        }
        Self {
            resolver,
            store,
            brokers,
        }
    }

    pub async fn create(&self, identity: ResourceIdentity) -> BrokerResult<ResourceState> {
        self.broker_for(&identity.service_id)?.create(identity).await
    }

    pub async fn bind(&self, lookup: &ResourceLookup) -> BrokerResult<Credentials> {
        self.route(lookup).await?.bind(lookup).await
    }

    pub async fn delete(&self, lookup: &ResourceLookup) -> BrokerResult<ResourceState> {
        self.route(lookup).await?.delete(lookup).await
    }

    pub fn catalog(&self) -> CatalogListing {
        self.resolver.listing()
    }

    /// Whether the record store answers.
    pub async fn ping(&self) -> BrokerResult<()> {
        Ok(self.store.ping().await?)
    }

    fn broker_for(&self, service_id: &str) -> BrokerResult<&Broker> {
        let family = self
            .resolver
            .family(service_id)
            .ok_or_else(|| BrokerError::NotFound(format!("Service {service_id} not found")))?;
        self.brokers.get(&family).ok_or_else(|| {
            BrokerError::Configuration(format!("no broker serves {family:?} services"))
        })
    }

    /// The request's service wins; without one, the stored record says where it belongs.
    async fn route(&self, lookup: &ResourceLookup) -> BrokerResult<&Broker> {
        if let Some(service_id) = lookup.service_id.as_deref().filter(|s| !s.is_empty()) {
            return self.broker_for(service_id);
        }
        let record = self
            .store
            .find_live(&lookup.external_id)
            .await?
            .ok_or_else(|| {
                BrokerError::NotFound(format!("Instance {} not found", lookup.external_id))
            })?;
        self.broker_for(&record.service_id)
    }
}
