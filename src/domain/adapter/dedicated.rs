//! One cloud instance (or replication group) per resource.

use crate::domain::catalog::PlanDescriptor;
use crate::domain::record::{Credentials, Endpoint, ResourceRecord, ResourceState};
use crate::error::BrokerError;
use crate::infra::cloud::{ControlPlane, CreateInstanceRequest, InstanceDescription};
use tracing::{info, warn};

pub struct DedicatedAdapter<'a> {
    plan: &'a PlanDescriptor,
    control_plane: &'a dyn ControlPlane,
}

impl<'a> DedicatedAdapter<'a> {
    pub fn new(plan: &'a PlanDescriptor, control_plane: &'a dyn ControlPlane) -> Self {
        Self {
            plan,
            control_plane,
        }
    }

    /// Asks the provider for a new instance. Acceptance only means creation has started.
    pub async fn create(
        &self,
        record: &mut ResourceRecord,
        secret: &str,
    ) -> Result<ResourceState, BrokerError> {
        let request = self.create_request(record, secret)?;
        self.control_plane
            .create_instance(&request)
            .await
            .map_err(|e| {
                warn!(
                    instance = %record.external_id,
                    identifier = %request.identifier,
                    error = %e,
                    "control plane rejected create"
                );
                BrokerError::provisioning("The cloud control plane rejected the instance.", e)
            })?;

        info!(
            instance = %record.external_id,
            identifier = %request.identifier,
            "dedicated instance creation started"
        );
        record.set_state(ResourceState::InProgress);
        Ok(ResourceState::InProgress)
    }

    /// Returns credentials once the instance is reachable. Until then the provider is asked
    /// for the instance status on every call and `NotReady` is returned.
    pub async fn bind(
        &self,
        record: &mut ResourceRecord,
        secret: &str,
    ) -> Result<Credentials, BrokerError> {
        if record.state == ResourceState::Ready && record.endpoint().is_some() {
            return record.credentials(secret);
        }

        let identifier = record.instance_identifier();
        let observed = self
            .control_plane
            .describe_instance(&identifier)
            .await
            .map_err(|e| {
                BrokerError::provisioning("Unable to read the instance status.", e)
            })?;

        let endpoint = observe_instance(&identifier, &observed)?;
        info!(
            instance = %record.external_id,
            host = %endpoint.host,
            port = endpoint.port,
            "dedicated instance is available"
        );
        record.set_endpoint(endpoint);
        record.set_state(ResourceState::Ready);
        record.credentials(secret)
    }

    /// Deletes the instance regardless of the stored state.
    pub async fn delete(&self, record: &mut ResourceRecord) -> Result<ResourceState, BrokerError> {
        let identifier = record.instance_identifier();
        match self.control_plane.delete_instance(&identifier).await {
            Ok(()) => {
                record.set_state(ResourceState::Gone);
                Ok(ResourceState::Gone)
            }
            Err(e) => {
                warn!(
                    instance = %record.external_id,
                    identifier = %identifier,
                    error = %e,
                    "control plane rejected delete"
                );
                record.set_state(ResourceState::NotGone);
                Err(BrokerError::provisioning(
                    "The cloud control plane rejected the deletion.",
                    e,
                ))
            }
        }
    }

    fn create_request(
        &self,
        record: &ResourceRecord,
        secret: &str,
    ) -> Result<CreateInstanceRequest, BrokerError> {
        let plan = self.plan;
        let instance_class = plan.instance_class.clone().ok_or_else(|| {
            BrokerError::Configuration(format!("dedicated plan {} has no instance class", plan.id))
        })?;
        let engine = record.engine;

        Ok(CreateInstanceRequest {
            identifier: record.instance_identifier(),
            engine,
            engine_version: plan.engine_version.clone(),
            instance_class,
            allocated_storage: plan.allocated_storage,
            database_name: engine
                .accepts_database_name()
                .then(|| record.database_name()),
            master_username: record.username.clone(),
            master_password: secret.to_string(),
            redundant: plan.redundant,
            encrypted: plan.encrypted,
            subnet_group: plan.subnet_group.clone(),
            security_group: plan.security_group.clone(),
            tags: record.tags.clone(),
            description: format!("{} for instance {}", plan.name, record.external_id),
            cache: engine.is_cache().then(|| plan.cache.clone()),
        })
    }
}

/// Classifies what the provider reported for `identifier`.
///
/// Exactly one match that is available and has an endpoint is ready. A single match in any
/// other status is not ready yet. No match, several matches, or an available instance without
/// an endpoint cannot be resolved by waiting.
pub fn observe_instance(
    identifier: &str,
    observed: &[InstanceDescription],
) -> Result<Endpoint, BrokerError> {
    let matches: Vec<_> = observed
        .iter()
        .filter(|d| d.identifier == identifier)
        .collect();

    match matches.as_slice() {
        [] => Err(BrokerError::InconsistentState(format!(
            "Instance {identifier} does not exist in the cloud control plane"
        ))),
        [only] if !only.is_available() => Err(BrokerError::NotReady(format!(
            "Instance {identifier} is not available yet (status: {})",
            only.status
        ))),
        [only] => only.endpoint.clone().ok_or_else(|| {
            BrokerError::InconsistentState(format!(
                "Instance {identifier} is available but reports no endpoint"
            ))
        }),
        many => Err(BrokerError::InconsistentState(format!(
            "Found {} instances named {identifier}",
            many.len()
        ))),
    }
}
