use anyhow::Context;
use cloud_resource_broker::app::{ControlPlanes, ServiceDispatcher};
use cloud_resource_broker::domain::{Catalog, PlanResolver};
use cloud_resource_broker::infra::cloud::{
    load_sdk_config, ElastiCacheControlPlane, RdsControlPlane, SimulatedControlPlane,
};
use cloud_resource_broker::infra::config::{CloudBackend, RecordStoreKind, Settings};
use cloud_resource_broker::infra::shared::SecretsFile;
use cloud_resource_broker::infra::telemetry;
use cloud_resource_broker::storage::{MemoryRecordStore, PostgresRecordStore, RecordStore};
use cloud_resource_broker::transport;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init();

    // --- Record store ---
    let store: Arc<dyn RecordStore> = match settings.record_store {
        RecordStoreKind::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            info!("connecting to the postgres record store");
            Arc::new(PostgresRecordStore::connect(url).await?)
        }
        RecordStoreKind::Memory => {
            warn!("using the in-memory record store; records are lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // --- Catalog and shared backings ---
    let catalog = Catalog::load(&settings.catalog_path)?;
    let backings = SecretsFile::load(&settings.secrets_path)?.connect_backings()?;
    let resolver = Arc::new(PlanResolver::new(
        catalog,
        backings,
        settings.max_allocated_storage,
    )?);
    info!(
        services = resolver.service_ids().count(),
        "catalog loaded from {}",
        settings.catalog_path.display()
    );

    // --- Cloud control planes ---
    let control_planes = match settings.cloud_backend {
        CloudBackend::Aws => {
            let region = settings
                .aws_region
                .as_deref()
                .context("AWS_DEFAULT_REGION must be set")?;
            let sdk_config = load_sdk_config(region).await;
            info!(region, "using AWS control planes");
            ControlPlanes {
                relational: Arc::new(RdsControlPlane::new(&sdk_config)),
                cache: Arc::new(ElastiCacheControlPlane::new(&sdk_config)),
            }
        }
        CloudBackend::Simulated => {
            warn!("using the simulated control plane; no cloud resources are created");
            ControlPlanes::single(Arc::new(SimulatedControlPlane::instant()))
        }
    };

    let dispatcher = Arc::new(ServiceDispatcher::new(
        resolver,
        store,
        settings.encryption_key.clone(),
        control_planes,
        &settings.db_prefix,
    ));
    if settings.auth.is_none() {
        warn!("AUTH_USER/AUTH_PASS not set; the broker API is unauthenticated");
    }
    let app_state = transport::http::AppState::new(dispatcher, settings.auth.clone());

    // --- API server ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    let app = transport::http::create_router(app_state)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()),
        )
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
    info!("broker listening on http://{}", settings.listen_addr);
    info!("Swagger UI available at http://{}/swagger-ui", settings.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
