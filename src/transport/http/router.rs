use crate::transport::http::handlers::{auth, bindings, catalog, health, instances};
use crate::transport::http::types::{
    AppState, BindRequest, BindingResponse, DeprovisionParams, DescriptionResponse,
    HealthResponse, ProvisionRequest,
};
use axum::middleware;
use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        catalog::catalog_handler,
        instances::provision_handler,
        instances::deprovision_handler,
        bindings::bind_handler,
        bindings::unbind_handler
    ),
    components(schemas(
        ProvisionRequest,
        BindRequest,
        DeprovisionParams,
        DescriptionResponse,
        BindingResponse,
        HealthResponse
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    let broker_api = Router::new()
        .route("/v2/catalog", get(catalog::catalog_handler))
        .route(
            "/v2/service_instances/:instance_id",
            put(instances::provision_handler).delete(instances::deprovision_handler),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(bindings::bind_handler).delete(bindings::unbind_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .merge(broker_api)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
