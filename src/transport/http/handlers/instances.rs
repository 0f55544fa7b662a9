use crate::app::ResourceLookup;
use crate::domain::record::ResourceIdentity;
use crate::transport::http::handlers::common::{
    error_response, json_400, optional_json, require_field,
};
use crate::transport::http::types::{
    AppState, DeprovisionParams, DescriptionResponse, ProvisionRequest,
};
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    put,
    path = "/v2/service_instances/{instance_id}",
    params(("instance_id" = String, Path, description = "Caller-chosen instance id")),
    request_body = ProvisionRequest,
    responses(
        (status = 201, description = "The instance was created", body = DescriptionResponse),
        (status = 400, description = "Unknown plan, missing fields or provisioning failure", body = DescriptionResponse),
        (status = 404, description = "Unknown service", body = DescriptionResponse),
        (status = 409, description = "The instance already exists", body = DescriptionResponse)
    )
)]
pub async fn provision_handler(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    request: Result<Json<ProvisionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(r) => r,
        Err(e) => {
            return json_400(e, "{service_id, plan_id, organization_guid, space_guid}")
        }
    };

    for (name, value) in [
        ("instance_id", instance_id.as_str()),
        ("service_id", request.service_id.as_str()),
        ("plan_id", request.plan_id.as_str()),
        ("organization_guid", request.organization_guid.as_str()),
        ("space_guid", request.space_guid.as_str()),
    ] {
        if let Err(e) = require_field(name, value) {
            return error_response(e);
        }
    }

    let identity = ResourceIdentity {
        external_id: instance_id,
        service_id: request.service_id,
        plan_id: request.plan_id,
        organization_id: request.organization_guid,
        space_id: request.space_guid,
    };

    match state.dispatcher.create(identity).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(DescriptionResponse::new("The instance was created")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    delete,
    path = "/v2/service_instances/{instance_id}",
    params(
        ("instance_id" = String, Path, description = "Instance to delete"),
        ("service_id" = Option<String>, Query, description = "Service of the instance"),
        ("plan_id" = Option<String>, Query, description = "Plan of the instance")
    ),
    responses(
        (status = 200, description = "The instance was deleted", body = DescriptionResponse),
        (status = 400, description = "Deletion failed; the instance is kept for a retry", body = DescriptionResponse),
        (status = 404, description = "Unknown instance", body = DescriptionResponse)
    )
)]
pub async fn deprovision_handler(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    query: Result<Query<DeprovisionParams>, QueryRejection>,
    body: Bytes,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return json_400(e, "?service_id=..&plan_id=.."),
    };
    let from_body: DeprovisionParams = match optional_json(&body) {
        Ok(b) => b,
        Err(e) => return json_400(e, "{service_id?, plan_id?}"),
    };

    let lookup = ResourceLookup {
        external_id: instance_id,
        service_id: query.service_id.or(from_body.service_id),
        plan_id: query.plan_id.or(from_body.plan_id),
    };

    match state.dispatcher.delete(&lookup).await {
        Ok(_) => (
            StatusCode::OK,
            Json(DescriptionResponse::new("The instance was deleted")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
