//! HTTP basic authentication for the broker API.

use crate::infra::config::BasicAuth;
use crate::transport::http::types::{AppState, DescriptionResponse};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use subtle::ConstantTimeEq;

pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.auth.as_deref() else {
        return next.run(request).await;
    };

    if authorized(request.headers(), expected) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(DescriptionResponse::new("Unauthorized")),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"broker\""),
    );
    response
}

fn authorized(headers: &HeaderMap, expected: &BasicAuth) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => {
            let user_ok = user.as_bytes().ct_eq(expected.username.as_bytes());
            let pass_ok = pass.as_bytes().ct_eq(expected.password.as_bytes());
            (user_ok & pass_ok).into()
        }
        None => false,
    }
}
