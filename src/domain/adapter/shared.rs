//! Tenants inside a pre-provisioned database server.

use crate::domain::catalog::{PlanDescriptor, SharedBacking};
use crate::domain::engine::TenantStatement;
use crate::domain::record::{Credentials, ResourceRecord, ResourceState};
use crate::error::BrokerError;
use async_trait::async_trait;

/// Administrative connection to a shared backing instance.
#[async_trait]
pub trait SharedBackend: Send + Sync {
    /// Runs a statement that returns no rows.
    async fn execute(&self, sql: &str) -> anyhow::Result<()>;

    /// Runs a query and reports whether it returned at least one row.
    async fn probe(&self, sql: &str) -> anyhow::Result<bool>;
}

pub struct SharedAdapter<'a> {
    plan: &'a PlanDescriptor,
    backing: &'a SharedBacking,
}

impl<'a> SharedAdapter<'a> {
    pub fn new(plan: &'a PlanDescriptor) -> Result<Self, BrokerError> {
        let backing = plan.shared.as_ref().ok_or_else(|| {
            BrokerError::Configuration(format!(
                "shared plan {} has no backing instance",
                plan.id
            ))
        })?;
        Ok(Self { plan, backing })
    }

    pub async fn create(
        &self,
        record: &mut ResourceRecord,
        secret: &str,
    ) -> Result<ResourceState, BrokerError> {
        let dialect = self
            .plan
            .engine
            .sql_dialect()
            .ok_or_else(|| BrokerError::UnsupportedEngine(self.plan.engine.to_string()))?;
        let statements =
            dialect.create_tenant(&record.database_name(), &record.username, secret)?;

        for statement in &statements {
            self.run(statement).await.map_err(|e| {
                tracing::warn!(
                    instance = %record.external_id,
                    step = statement.label,
                    error = %e,
                    "shared tenant step failed"
                );
                BrokerError::provisioning(
                    format!("Failed to {} on the shared instance.", statement.label),
                    format!("{e:#}"),
                )
            })?;
        }

        record.set_endpoint(self.backing.endpoint.clone());
        record.set_state(ResourceState::Ready);
        Ok(ResourceState::Ready)
    }

    /// Shared resources are usable as soon as they are created; nothing is called here.
    pub fn bind(&self, record: &mut ResourceRecord, secret: &str) -> Result<Credentials, BrokerError> {
        if record.endpoint().is_none() {
            record.set_endpoint(self.backing.endpoint.clone());
        }
        record.credentials(secret)
    }

    pub async fn delete(&self, record: &mut ResourceRecord) -> Result<ResourceState, BrokerError> {
        let outcome = self.drop_tenant(record).await;
        match outcome {
            Ok(()) => {
                record.set_state(ResourceState::Gone);
                Ok(ResourceState::Gone)
            }
            Err(e) => {
                record.set_state(ResourceState::NotGone);
                Err(e)
            }
        }
    }

    async fn drop_tenant(&self, record: &ResourceRecord) -> Result<(), BrokerError> {
        let dialect = self
            .plan
            .engine
            .sql_dialect()
            .ok_or_else(|| BrokerError::UnsupportedEngine(self.plan.engine.to_string()))?;
        for statement in dialect.drop_tenant(&record.database_name(), &record.username)? {
            self.run(&statement).await.map_err(|e| {
                tracing::warn!(
                    instance = %record.external_id,
                    step = statement.label,
                    error = %e,
                    "shared tenant teardown failed"
                );
                BrokerError::provisioning(
                    format!("Failed to {} on the shared instance.", statement.label),
                    format!("{e:#}"),
                )
            })?;
        }
        Ok(())
    }

    async fn run(&self, statement: &TenantStatement) -> anyhow::Result<()> {
        if let Some(guard) = &statement.guard {
            if self.backing.backend.probe(guard).await? {
                tracing::debug!(step = statement.label, "already applied, skipping");
                return Ok(());
            }
        }
        self.backing.backend.execute(&statement.sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::EngineType;
    use crate::domain::record::tests::{identity, plan, test_key};
    use crate::domain::record::{AdapterKind, Endpoint};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedBackend {
        executed: Mutex<Vec<String>>,
        existing: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SharedBackend for ScriptedBackend {
        async fn execute(&self, sql: &str) -> anyhow::Result<()> {
            if let Some(needle) = self.fail_on {
                if sql.contains(needle) {
                    anyhow::bail!("permission denied");
                }
            }
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(())
        }

        async fn probe(&self, sql: &str) -> anyhow::Result<bool> {
            Ok(self.existing.iter().any(|needle| sql.contains(needle)))
        }
    }

    fn shared_plan(engine: EngineType, backend: Arc<ScriptedBackend>) -> PlanDescriptor {
        let mut plan = plan(engine, AdapterKind::Shared);
        plan.shared = Some(SharedBacking {
            engine,
            endpoint: Endpoint {
                host: "shared.internal".into(),
                port: 5432,
            },
            backend,
        });
        plan
    }

    #[tokio::test]
    async fn create_runs_the_three_steps_and_adopts_the_backing_endpoint() {
        let backend = Arc::new(ScriptedBackend::default());
        let plan = shared_plan(EngineType::Postgres, backend.clone());
        let (mut record, password) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let adapter = SharedAdapter::new(&plan).unwrap();
        let state = adapter.create(&mut record, &password).await.unwrap();

        assert_eq!(state, ResourceState::Ready);
        assert_eq!(record.host.as_deref(), Some("shared.internal"));
        let executed = backend.executed.lock().unwrap();
        assert_eq!(executed.len(), 3);
        assert!(executed[0].starts_with("CREATE DATABASE"));
        assert!(executed[1].starts_with("CREATE USER"));
        assert!(executed[2].starts_with("GRANT"));
    }

    #[tokio::test]
    async fn create_skips_steps_that_already_exist() {
        let backend = Arc::new(ScriptedBackend {
            existing: vec!["pg_database"],
            ..Default::default()
        });
        let plan = shared_plan(EngineType::Postgres, backend.clone());
        let (mut record, password) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        SharedAdapter::new(&plan)
            .unwrap()
            .create(&mut record, &password)
            .await
            .unwrap();

        let executed = backend.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].starts_with("CREATE USER"));
    }

    #[tokio::test]
    async fn failed_step_stops_create() {
        let backend = Arc::new(ScriptedBackend {
            fail_on: Some("CREATE USER"),
            ..Default::default()
        });
        let plan = shared_plan(EngineType::MySql, backend.clone());
        let (mut record, password) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let err = SharedAdapter::new(&plan)
            .unwrap()
            .create(&mut record, &password)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("permission denied"));
        assert_eq!(record.state, ResourceState::NotCreated);
        assert_eq!(backend.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_drops_database_then_principal() {
        let backend = Arc::new(ScriptedBackend::default());
        let plan = shared_plan(EngineType::MySql, backend.clone());
        let (mut record, _) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let state = SharedAdapter::new(&plan)
            .unwrap()
            .delete(&mut record)
            .await
            .unwrap();

        assert_eq!(state, ResourceState::Gone);
        let executed = backend.executed.lock().unwrap();
        assert!(executed[0].starts_with("DROP DATABASE IF EXISTS"));
        assert!(executed[1].starts_with("DROP USER IF EXISTS"));
    }

    #[tokio::test]
    async fn failed_drop_leaves_the_record_not_gone() {
        let backend = Arc::new(ScriptedBackend {
            fail_on: Some("DROP USER"),
            ..Default::default()
        });
        let plan = shared_plan(EngineType::Postgres, backend);
        let (mut record, _) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let result = SharedAdapter::new(&plan).unwrap().delete(&mut record).await;

        assert!(matches!(result, Err(BrokerError::Provisioning { .. })));
        assert_eq!(record.state, ResourceState::NotGone);
    }

    #[tokio::test]
    async fn engines_without_a_dialect_are_unsupported() {
        let backend = Arc::new(ScriptedBackend::default());
        let plan = shared_plan(EngineType::OracleSe1, backend.clone());
        let (mut record, password) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let err = SharedAdapter::new(&plan)
            .unwrap()
            .create(&mut record, &password)
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::UnsupportedEngine(_)));
        assert!(backend.executed.lock().unwrap().is_empty());
    }

    #[test]
    fn bind_returns_credentials_without_calling_out() {
        let backend = Arc::new(ScriptedBackend::default());
        let plan = shared_plan(EngineType::Postgres, backend.clone());
        let (mut record, password) =
            ResourceRecord::provision(identity("i-1"), &plan, "db", &test_key()).unwrap();

        let creds = SharedAdapter::new(&plan)
            .unwrap()
            .bind(&mut record, &password)
            .unwrap();

        assert!(creds.uri.starts_with("postgres://"));
        assert!(creds.uri.ends_with(&format!("/{}", record.database_name())));
        assert!(backend.executed.lock().unwrap().is_empty());
    }
}
