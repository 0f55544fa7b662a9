use crate::app::ResourceLookup;
use crate::transport::http::handlers::common::{error_response, json_400, optional_json};
use crate::transport::http::types::{AppState, BindRequest, BindingResponse};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    put,
    path = "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
    params(
        ("instance_id" = String, Path, description = "Bound instance"),
        ("binding_id" = String, Path, description = "Caller-chosen binding id")
    ),
    request_body = BindRequest,
    responses(
        (status = 201, description = "Credentials for the instance", body = BindingResponse),
        (status = 400, description = "The instance is not ready yet", body = crate::transport::http::types::DescriptionResponse),
        (status = 404, description = "Unknown instance", body = crate::transport::http::types::DescriptionResponse)
    )
)]
pub async fn bind_handler(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let request: BindRequest = match optional_json(&body) {
        Ok(r) => r,
        Err(e) => return json_400(e, "{service_id?, plan_id?, app_guid?}"),
    };

    let lookup = ResourceLookup {
        external_id: instance_id,
        service_id: request.service_id,
        plan_id: request.plan_id,
    };

    match state.dispatcher.bind(&lookup).await {
        Ok(credentials) => {
            tracing::info!(
                instance = %lookup.external_id,
                binding = %binding_id,
                app = request.app_guid.as_deref().unwrap_or("-"),
                "binding issued"
            );
            (StatusCode::CREATED, Json(BindingResponse { credentials })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Bindings hold no state of their own, so there is nothing to revoke.
#[utoipa::path(
    delete,
    path = "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
    params(
        ("instance_id" = String, Path, description = "Bound instance"),
        ("binding_id" = String, Path, description = "Binding to remove")
    ),
    responses((status = 200, description = "Always succeeds with an empty object"))
)]
pub async fn unbind_handler(Path((instance_id, binding_id)): Path<(String, String)>) -> impl IntoResponse {
    tracing::debug!(instance = %instance_id, binding = %binding_id, "unbind");
    (StatusCode::OK, Json(serde_json::json!({})))
}
