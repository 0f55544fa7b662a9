use crate::transport::http::types::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/v2/catalog",
    responses(
        (status = 200, description = "Services and plans offered by the broker"),
        (status = 401, description = "Missing or wrong credentials", body = crate::transport::http::types::DescriptionResponse)
    )
)]
pub async fn catalog_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.dispatcher.catalog()))
}
