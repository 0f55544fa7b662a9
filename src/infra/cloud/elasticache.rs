//! AWS ElastiCache control plane. Each dedicated cache is one Redis replication group.

use super::{endpoint_from, CloudError, ControlPlane, CreateInstanceRequest, InstanceDescription};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_elasticache::error::{DisplayErrorContext, SdkError};
use aws_sdk_elasticache::types::Tag;
use aws_sdk_elasticache::Client as ElastiCacheClient;
use tracing::{debug, info};

pub const REDIS_PORT: i32 = 6379;

pub struct ElastiCacheControlPlane {
    client: ElastiCacheClient,
}

impl std::fmt::Debug for ElastiCacheControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElastiCacheControlPlane")
            .finish_non_exhaustive()
    }
}

impl ElastiCacheControlPlane {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: ElastiCacheClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl ControlPlane for ElastiCacheControlPlane {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<(), CloudError> {
        if !request.engine.is_cache() {
            return Err(CloudError::InvalidRequest(format!(
                "{} is not an ElastiCache engine",
                request.engine
            )));
        }
        let cache = request.cache.clone().unwrap_or_default();
        // Failover needs a replica to fail over to.
        let failover = request.redundant && cache.num_cache_clusters > 1;

        let tags = request
            .tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Vec<_>>();

        info!(
            identifier = %request.identifier,
            node_type = %request.instance_class,
            clusters = cache.num_cache_clusters,
            "creating ElastiCache replication group"
        );
        self.client
            .create_replication_group()
            .replication_group_id(&request.identifier)
            .replication_group_description(&request.description)
            .engine(request.engine.as_str())
            .set_engine_version(request.engine_version.clone())
            .cache_node_type(&request.instance_class)
            .num_cache_clusters(cache.num_cache_clusters)
            .automatic_failover_enabled(failover)
            .multi_az_enabled(failover)
            .at_rest_encryption_enabled(request.encrypted)
            .transit_encryption_enabled(true)
            .auth_token(&request.master_password)
            .port(REDIS_PORT)
            .set_cache_parameter_group_name(cache.parameter_group)
            .set_cache_subnet_group_name(request.subnet_group.clone())
            .set_security_group_ids(request.security_group.clone().map(|sg| vec![sg]))
            .set_preferred_maintenance_window(cache.maintenance_window)
            .set_snapshot_window(cache.snapshot_window)
            .set_snapshot_retention_limit(cache.snapshot_retention_limit)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("CreateReplicationGroup", e))?;
        Ok(())
    }

    async fn describe_instance(
        &self,
        identifier: &str,
    ) -> Result<Vec<InstanceDescription>, CloudError> {
        let output = match self
            .client
            .describe_replication_groups()
            .replication_group_id(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_replication_group_not_found_fault())
                    .unwrap_or(false) =>
            {
                debug!(identifier, "replication group not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(classify("DescribeReplicationGroups", e)),
        };

        Ok(output
            .replication_groups()
            .iter()
            .map(|group| InstanceDescription {
                identifier: group.replication_group_id().unwrap_or_default().to_string(),
                status: group.status().unwrap_or_default().to_string(),
                endpoint: group
                    .node_groups()
                    .first()
                    .and_then(|ng| ng.primary_endpoint())
                    .and_then(|ep| endpoint_from(ep.address(), ep.port())),
            })
            .collect())
    }

    async fn delete_instance(&self, identifier: &str) -> Result<(), CloudError> {
        info!(identifier, "deleting ElastiCache replication group");
        self.client
            .delete_replication_group()
            .replication_group_id(identifier)
            .send()
            .await
            .map_err(|e| classify("DeleteReplicationGroup", e))?;
        Ok(())
    }
}

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> CloudError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) => CloudError::Rejected { operation, message },
        _ => CloudError::Transport { operation, message },
    }
}
