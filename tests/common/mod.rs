//! Shared fixtures: a catalog with shared, dedicated and cache plans, a recording shared
//! backend, and a dispatcher over the in-memory store and the simulated control plane.
#![allow(dead_code)]

use async_trait::async_trait;
use cloud_resource_broker::app::{ControlPlanes, ServiceDispatcher};
use cloud_resource_broker::domain::adapter::SharedBackend;
use cloud_resource_broker::domain::{Catalog, Endpoint, EngineType, PlanResolver, SharedBacking};
use cloud_resource_broker::{EncryptionKey, MemoryRecordStore, ResourceIdentity, SimulatedControlPlane};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const RDS_SERVICE: &str = "db80ca29-2d1b-4fbc-aad3-d03c0bfa7593";
pub const REDIS_SERVICE: &str = "cda65825-e357-4a93-a24b-9ab138d97815";
pub const SHARED_PSQL: &str = "da91e15c-98c9-46a9-b114-02b8d28062c6";
pub const MEDIUM_PSQL: &str = "332e0168-6969-4bd7-b07f-29f08c4bf78d";
pub const MEDIUM_SQLSERVER: &str = "4a9e1e31-67a2-4e2f-8c3b-4a2e9b2a1c10";
pub const REDIS_SMALL: &str = "475e36bf-387f-44c1-9b81-575fec2ee443";

pub const SHARED_HOST: &str = "shared-pg.internal";

pub const CATALOG: &str = r#"
services:
  - id: db80ca29-2d1b-4fbc-aad3-d03c0bfa7593
    name: aws-rds
    description: Relational databases
    bindable: true
    tags: [database, RDS]
    metadata:
      displayName: RDS Database
    family: relational
    plans:
      - id: da91e15c-98c9-46a9-b114-02b8d28062c6
        name: shared-psql
        description: Shared infrastructure for Postgres DB
        free: true
        adapter: shared
        dbType: postgres
      - id: 332e0168-6969-4bd7-b07f-29f08c4bf78d
        name: medium-psql
        description: Dedicated medium RDS Postgres DB instance
        adapter: dedicated
        dbType: postgres
        instanceClass: db.m5.large
        allocatedStorage: 20
        encrypted: true
        subnetGroup: broker-subnets
        securityGroup: sg-12345
        tags:
          environment: test
      - id: 4a9e1e31-67a2-4e2f-8c3b-4a2e9b2a1c10
        name: medium-sqlserver
        description: Dedicated SQL Server instance
        adapter: dedicated
        dbType: sqlserver-se
        instanceClass: db.m5.large
  - id: cda65825-e357-4a93-a24b-9ab138d97815
    name: redis
    description: In-memory caches
    family: cache
    plans:
      - id: 475e36bf-387f-44c1-9b81-575fec2ee443
        name: redis-small
        description: Single node Redis
        adapter: dedicated
        dbType: redis
        instanceClass: cache.t3.small
"#;

/// Records every statement it is asked to run.
#[derive(Default)]
pub struct RecordingSharedBackend {
    pub statements: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<String>>,
}

impl RecordingSharedBackend {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn fail_on(&self, needle: Option<&str>) {
        *self.fail_on.lock().unwrap() = needle.map(str::to_string);
    }
}

#[async_trait]
impl SharedBackend for RecordingSharedBackend {
    async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        if let Some(needle) = self.fail_on.lock().unwrap().as_deref() {
            if sql.contains(needle) {
                anyhow::bail!("backend refused: {needle}");
            }
        }
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn probe(&self, _sql: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

pub struct Harness {
    pub dispatcher: Arc<ServiceDispatcher>,
    pub store: Arc<MemoryRecordStore>,
    pub plane: Arc<SimulatedControlPlane>,
    pub backend: Arc<RecordingSharedBackend>,
    pub key: EncryptionKey,
}

/// One simulated control plane serving both families.
pub fn harness() -> Harness {
    let plane = Arc::new(SimulatedControlPlane::new());
    build(plane.clone(), plane)
}

/// Separate simulated control planes for relational and cache services. The harness's
/// `plane` is the relational one.
pub fn split_harness() -> (Harness, Arc<SimulatedControlPlane>) {
    let relational = Arc::new(SimulatedControlPlane::new());
    let cache = Arc::new(SimulatedControlPlane::new());
    (build(relational, cache.clone()), cache)
}

/// Resolver over [`CATALOG`] with `backend` behind the shared plan.
pub fn resolver(backend: Arc<RecordingSharedBackend>) -> PlanResolver {
    let backings = HashMap::from([(
        SHARED_PSQL.to_string(),
        SharedBacking {
            engine: EngineType::Postgres,
            endpoint: Endpoint {
                host: SHARED_HOST.to_string(),
                port: 5432,
            },
            backend,
        },
    )]);
    let catalog = Catalog::from_yaml_str(CATALOG).expect("fixture catalog parses");
    PlanResolver::new(catalog, backings, 1024).expect("fixture catalog is valid")
}

pub fn key() -> EncryptionKey {
    EncryptionKey::new(b"an-encryption-key-of-32-bytes!!!".to_vec()).expect("32 byte key")
}

fn build(plane: Arc<SimulatedControlPlane>, cache_plane: Arc<SimulatedControlPlane>) -> Harness {
    let backend = Arc::new(RecordingSharedBackend::default());
    let resolver = Arc::new(resolver(backend.clone()));
    let store = Arc::new(MemoryRecordStore::new());
    let key = key();

    let dispatcher = Arc::new(ServiceDispatcher::new(
        resolver,
        store.clone(),
        key.clone(),
        ControlPlanes {
            relational: plane.clone(),
            cache: cache_plane,
        },
        "db",
    ));

    Harness {
        dispatcher,
        store,
        plane,
        backend,
        key,
    }
}

pub fn identity(external_id: &str, service_id: &str, plan_id: &str) -> ResourceIdentity {
    ResourceIdentity {
        external_id: external_id.to_string(),
        service_id: service_id.to_string(),
        plan_id: plan_id.to_string(),
        organization_id: "org-guid".to_string(),
        space_id: "space-guid".to_string(),
    }
}
