//! AWS RDS control plane for dedicated relational instances.

use super::{endpoint_from, CloudError, ControlPlane, CreateInstanceRequest, InstanceDescription};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rds::error::{DisplayErrorContext, SdkError};
use aws_sdk_rds::types::Tag;
use aws_sdk_rds::Client as RdsClient;
use tracing::{debug, info};

pub struct RdsControlPlane {
    client: RdsClient,
}

impl std::fmt::Debug for RdsControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdsControlPlane").finish_non_exhaustive()
    }
}

impl RdsControlPlane {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: RdsClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl ControlPlane for RdsControlPlane {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<(), CloudError> {
        if request.engine.is_cache() {
            return Err(CloudError::InvalidRequest(format!(
                "{} is not an RDS engine",
                request.engine
            )));
        }

        let tags = request
            .tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<Vec<_>>();

        info!(
            identifier = %request.identifier,
            engine = %request.engine,
            class = %request.instance_class,
            "creating RDS instance"
        );
        self.client
            .create_db_instance()
            .db_instance_identifier(&request.identifier)
            .db_instance_class(&request.instance_class)
            .engine(request.engine.as_str())
            .set_engine_version(request.engine_version.clone())
            .allocated_storage(request.allocated_storage)
            .set_db_name(request.database_name.clone())
            .master_username(&request.master_username)
            .master_user_password(&request.master_password)
            .auto_minor_version_upgrade(true)
            .multi_az(request.redundant)
            .storage_encrypted(request.encrypted)
            .publicly_accessible(false)
            .set_db_subnet_group_name(request.subnet_group.clone())
            .set_vpc_security_group_ids(request.security_group.clone().map(|sg| vec![sg]))
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("CreateDBInstance", e))?;
        Ok(())
    }

    async fn describe_instance(
        &self,
        identifier: &str,
    ) -> Result<Vec<InstanceDescription>, CloudError> {
        let output = match self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_db_instance_not_found_fault())
                    .unwrap_or(false) =>
            {
                debug!(identifier, "RDS instance not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(classify("DescribeDBInstances", e)),
        };

        Ok(output
            .db_instances()
            .iter()
            .map(|db| InstanceDescription {
                identifier: db.db_instance_identifier().unwrap_or_default().to_string(),
                status: db.db_instance_status().unwrap_or_default().to_string(),
                endpoint: db
                    .endpoint()
                    .and_then(|ep| endpoint_from(ep.address(), ep.port())),
            })
            .collect())
    }

    async fn delete_instance(&self, identifier: &str) -> Result<(), CloudError> {
        info!(identifier, "deleting RDS instance");
        self.client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(true)
            .send()
            .await
            .map_err(|e| classify("DeleteDBInstance", e))?;
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
