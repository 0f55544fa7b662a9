//! Lifecycle orchestration for one service family.
//!
//! The broker owns the sequence resolve plan → build record → drive adapter → persist.
//! Adapters never recover from their own failures and the broker never retries; callers
//! re-issue the request.

use crate::crypto::EncryptionKey;
use crate::domain::adapter::ProvisioningAdapter;
use crate::domain::catalog::{PlanDescriptor, PlanResolver, ServiceFamily};
use crate::domain::record::{Credentials, ResourceIdentity, ResourceRecord, ResourceState};
use crate::error::{BrokerError, BrokerResult};
use crate::infra::cloud::ControlPlane;
use crate::storage::records::RecordStore;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const CREATE_FAILED: &str = "There was an error creating the instance.";
pub const DELETE_FAILED: &str = "There was an error deleting the instance.";

/// Identifies an existing resource. Plan and service are optional and fall back to the
/// values stored on the record.
#[derive(Debug, Clone, Default)]
pub struct ResourceLookup {
    pub external_id: String,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
}

impl ResourceLookup {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Self::default()
        }
    }
}

pub struct Broker {
    family: ServiceFamily,
    resolver: Arc<PlanResolver>,
    store: Arc<dyn RecordStore>,
    key: EncryptionKey,
    control_plane: Arc<dyn ControlPlane>,
    db_prefix: String,
}

impl Broker {
    pub fn new(
        family: ServiceFamily,
        resolver: Arc<PlanResolver>,
        store: Arc<dyn RecordStore>,
        key: EncryptionKey,
        control_plane: Arc<dyn ControlPlane>,
        db_prefix: impl Into<String>,
    ) -> Self {
        Self {
            family,
            resolver,
            store,
            key,
            control_plane,
            db_prefix: db_prefix.into(),
        }
    }

    pub async fn create(&self, identity: ResourceIdentity) -> BrokerResult<ResourceState> {
        if self.store.find_live(&identity.external_id).await?.is_some() {
            return Err(BrokerError::Conflict(format!(
                "The instance {} already exists",
                identity.external_id
            )));
        }

        let plan = self.resolver.resolve(&identity.service_id, &identity.plan_id)?;
        let (mut record, password) =
            ResourceRecord::provision(identity, plan, &self.db_prefix, &self.key)?;
        let adapter = ProvisioningAdapter::for_plan(plan, self.control_plane.as_ref())?;

        let state = adapter
            .create(&mut record, &password)
            .await
            .map_err(|e| {
                warn!(
                    instance = %record.external_id,
                    plan = %plan.id,
                    kind = e.kind(),
                    error = %e,
                    "create failed"
                );
                BrokerError::provisioning(CREATE_FAILED, e)
            })?;

        if let Err(e) = self.store.insert(&record).await {
            // The adapter already acted; nothing points at what it created any more.
            warn!(
                instance = %record.external_id,
                database = %record.database,
                error = %e,
                "record not persisted after create, resource is orphaned"
            );
            return Err(e.into());
        }

        info!(
            instance = %record.external_id,
            plan = %plan.id,
            adapter = %record.adapter_kind,
            state = %state,
            "instance created"
        );
        Ok(state)
    }

    pub async fn bind(&self, lookup: &ResourceLookup) -> BrokerResult<Credentials> {
        let mut record = self.load(&lookup.external_id).await?;
        let plan = self.plan_for(&record, lookup)?;
        let adapter = ProvisioningAdapter::for_plan(plan, self.control_plane.as_ref())?;

        let password = record.secret(&self.key)?;
        let before = (record.state, record.host.clone(), record.port);
        let credentials = adapter.bind(&mut record, &password).await?;

        if before != (record.state, record.host.clone(), record.port) {
            self.store.update(&record).await.map_err(|e| {
                error!(instance = %record.external_id, error = %e, "failed to persist bind");
                BrokerError::from(e)
            })?;
            info!(instance = %record.external_id, state = %record.state, "instance ready");
        }
        Ok(credentials)
    }

    pub async fn delete(&self, lookup: &ResourceLookup) -> BrokerResult<ResourceState> {
        let mut record = self.load(&lookup.external_id).await?;
        let plan = self.plan_for(&record, lookup)?;
        let adapter = ProvisioningAdapter::for_plan(plan, self.control_plane.as_ref())?;

        match adapter.delete(&mut record).await {
            Ok(_) => {
                record.mark_deleted();
                self.store.update(&record).await.map_err(|e| {
                    error!(instance = %record.external_id, error = %e, "failed to persist delete");
                    BrokerError::from(e)
                })?;
                info!(instance = %record.external_id, "instance deleted");
                Ok(ResourceState::Gone)
            }
            Err(e) => {
                warn!(
                    instance = %record.external_id,
                    kind = e.kind(),
                    error = %e,
                    "delete failed, instance is not gone"
                );
                if let Err(store_err) = self.store.update(&record).await {
                    error!(
                        instance = %record.external_id,
                        error = %store_err,
                        "failed to persist not-gone state"
                    );
                }
                Err(BrokerError::provisioning(DELETE_FAILED, e))
            }
        }
    }

    async fn load(&self, external_id: &str) -> BrokerResult<ResourceRecord> {
        self.store
            .find_live(external_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("Instance {external_id} not found")))
    }

    /// Resolves the plan of an existing record. The record must belong to this broker's
    /// family and to the service named in the request, if any; otherwise it is not found here.
    fn plan_for(
        &self,
        record: &ResourceRecord,
        lookup: &ResourceLookup,
    ) -> BrokerResult<&PlanDescriptor> {
        let requested_service = lookup.service_id.as_deref().filter(|s| !s.is_empty());
        if requested_service.is_some_and(|s| s != record.service_id)
            || self.resolver.family(&record.service_id) != Some(self.family)
        {
            warn!(
                instance = %record.external_id,
                service = %record.service_id,
                requested = requested_service.unwrap_or("-"),
                "instance does not belong to the requested service"
            );
            return Err(BrokerError::NotFound(format!(
                "Instance {} not found in service {}",
                record.external_id,
                requested_service.unwrap_or(&record.service_id)
            )));
        }

        let plan_id = lookup
            .plan_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&record.plan_id);
        let plan = self.resolver.resolve(&record.service_id, plan_id)?;
        if plan.adapter_kind != record.adapter_kind {
            return Err(BrokerError::Configuration(format!(
                "Instance {} was created as {} but plan {} is now {}",
                record.external_id, record.adapter_kind, plan.id, plan.adapter_kind
            )));
        }
        Ok(plan)
    }
}
