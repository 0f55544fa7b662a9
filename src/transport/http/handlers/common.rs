use crate::error::BrokerError;
use crate::transport::http::types::DescriptionResponse;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;

pub fn status_for(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::Validation(_)
        | BrokerError::UnsupportedEngine(_)
        | BrokerError::NotReady(_)
        | BrokerError::Provisioning { .. } => StatusCode::BAD_REQUEST,
        BrokerError::Conflict(_) => StatusCode::CONFLICT,
        BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
        BrokerError::InconsistentState(_)
        | BrokerError::Precondition(_)
        | BrokerError::Crypto(_)
        | BrokerError::Configuration(_)
        | BrokerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"description": ...}` with the status of the error kind.
pub fn error_response(err: BrokerError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "request failed");
    } else {
        tracing::debug!(kind = err.kind(), error = %err, "request rejected");
    }
    (status, Json(DescriptionResponse::new(err.to_string()))).into_response()
}

pub fn json_400(err: impl std::fmt::Display, expected: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(DescriptionResponse::new(format!(
            "Invalid JSON body: {err} (expected: {expected})"
        ))),
    )
        .into_response()
}

/// Parses an optional JSON body; an empty body yields the default value.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
}

/// Rejects blank identifiers that would otherwise reach the store.
pub fn require_field(name: &str, value: &str) -> Result<(), BrokerError> {
    if value.trim().is_empty() {
        return Err(BrokerError::Validation(format!("{name} is required")));
    }
    Ok(())
}
