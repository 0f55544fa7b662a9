use cloud_resource_broker::domain::{Catalog, PlanResolver};
use cloud_resource_broker::infra::cloud::load_sdk_config;
use cloud_resource_broker::infra::config::{CloudBackend, RecordStoreKind, Settings};
use cloud_resource_broker::infra::shared::SecretsFile;
use cloud_resource_broker::storage::{PostgresRecordStore, RecordStore};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- [--skip-backings]\n\
         \n\
         Requires env vars:\n\
           ENC_KEY, DATABASE_URL (postgres store), AWS_DEFAULT_REGION (aws backend)\n\
         Optional:\n\
           DB_PREFIX, RECORD_STORE, CLOUD_BACKEND, CATALOG_PATH, SECRETS_PATH,\n\
           MAX_ALLOCATED_STORAGE, LISTEN_ADDR, AUTH_USER, AUTH_PASS\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let skip_backings = args.iter().any(|a| a == "--skip-backings");

    // Force-read config (nice error messages if missing)
    let settings = Settings::from_env()?;

    println!("> Preflight:");
    println!("  DB_PREFIX={}", settings.db_prefix);
    println!("  RECORD_STORE={:?}", settings.record_store);
    println!("  CLOUD_BACKEND={:?}", settings.cloud_backend);
    println!("  CATALOG_PATH={}", settings.catalog_path.display());
    println!("  SECRETS_PATH={}", settings.secrets_path.display());
    println!("  MAX_ALLOCATED_STORAGE={}", settings.max_allocated_storage);
    println!(
        "  Basic auth: {}",
        if settings.auth.is_some() { "enabled" } else { "disabled" }
    );

    // Catalog + secrets must agree before anything is served.
    let catalog = Catalog::load(&settings.catalog_path)?;
    let plan_count: usize = catalog.services.iter().map(|s| s.plans.len()).sum();
    println!(
        "  Catalog: {} services, {} plans",
        catalog.services.len(),
        plan_count
    );
    let secrets = SecretsFile::load(&settings.secrets_path)?;
    println!("  Shared backings configured: {}", secrets.shared_backends.len());
    let resolver = PlanResolver::new(
        catalog,
        secrets.connect_backings()?,
        settings.max_allocated_storage,
    )?;
    println!("  Catalog validated against shared backings (ok).");

    // Record store connectivity
    match settings.record_store {
        RecordStoreKind::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
            let store = PostgresRecordStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Record store unreachable: {}", e))?;
            store.ping().await?;
            println!("  Record store reachable, resource_records table present.");
        }
        RecordStoreKind::Memory => {
            eprintln!("  Warning: in-memory record store; records are lost on restart.");
        }
    }

    // Shared backings accept our admin credentials
    if skip_backings {
        println!("  Skipping shared backing checks.");
    } else {
        let mut failed = 0usize;
        for (plan, backing) in resolver.shared_backings() {
            match backing.backend.probe("SELECT 1").await {
                Ok(_) => println!(
                    "  Shared backing for plan {} at {}:{} (ok)",
                    plan.id, backing.endpoint.host, backing.endpoint.port
                ),
                Err(e) => {
                    failed += 1;
                    eprintln!(
                        "  Shared backing for plan {} at {}:{} FAILED: {:#}",
                        plan.id, backing.endpoint.host, backing.endpoint.port, e
                    );
                }
            }
        }
        if failed > 0 {
            return Err(anyhow::anyhow!(
                "{} shared backing(s) unreachable. Re-run with --skip-backings to ignore",
                failed
            ));
        }
    }

    // AWS credentials resolve for the configured region
    if settings.cloud_backend == CloudBackend::Aws {
        let region = settings.aws_region.as_deref().unwrap_or_default();
        let sdk_config = load_sdk_config(region).await;
        if sdk_config.credentials_provider().is_none() {
            eprintln!("  Warning: no AWS credentials provider found; cloud calls will fail.");
        } else {
            println!("  AWS credentials provider configured for region {}.", region);
        }
    }

    println!("> Preflight OK.");
    Ok(())
}
