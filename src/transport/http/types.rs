use crate::app::ServiceDispatcher;
use crate::domain::record::Credentials;
use crate::infra::config::BasicAuth;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ServiceDispatcher>,
    /// `None` disables authentication on the broker API.
    pub auth: Option<Arc<BasicAuth>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<ServiceDispatcher>, auth: Option<BasicAuth>) -> Self {
        Self {
            dispatcher,
            auth: auth.map(Arc::new),
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    /// Accepted for compatibility; provisioning is fully determined by the plan.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub parameters: Option<JsonValue>,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct BindRequest {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub app_guid: Option<String>,
}

/// Identifies the instance's service and plan on delete. Sent as query parameters or as a
/// JSON body; query parameters win.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct DeprovisionParams {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DescriptionResponse {
    pub description: String,
}

impl DescriptionResponse {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct BindingResponse {
    /// `uri`, `username`, `password`, `host`, `port` and `db_name` (relational only).
    #[schema(value_type = Object)]
    pub credentials: Credentials,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
