//! Connections to pre-provisioned shared database servers, configured in `secrets.yml`.

use crate::domain::adapter::SharedBackend;
use crate::domain::catalog::SharedBacking;
use crate::domain::engine::{EngineType, SqlDialect};
use crate::domain::record::Endpoint;
use crate::error::BrokerError;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Executor, MySqlPool, PgPool};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

const MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct SecretsFile {
    #[serde(default)]
    pub shared_backends: Vec<SharedBackendConfig>,
}

#[derive(Clone, Deserialize)]
pub struct SharedBackendConfig {
    pub plan_id: String,
    pub engine: EngineType,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
    #[serde(default)]
    pub sslmode: Option<String>,
}

impl fmt::Debug for SharedBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBackendConfig")
            .field("plan_id", &self.plan_id)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("db_name", &self.db_name)
            .field("sslmode", &self.sslmode)
            .finish_non_exhaustive()
    }
}

impl SecretsFile {
    pub fn from_yaml_str(raw: &str) -> Result<Self, BrokerError> {
        serde_yaml::from_str(raw)
            .map_err(|e| BrokerError::Configuration(format!("invalid secrets file: {e}")))
    }

    /// A missing file means no shared plans can be served; that is checked by the resolver.
    pub fn load(path: &Path) -> Result<Self, BrokerError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "secrets file not found, no shared backings");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::Configuration(format!("cannot read secrets {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Builds a lazily connecting pool per shared plan, keyed by plan id.
    pub fn connect_backings(&self) -> Result<HashMap<String, SharedBacking>, BrokerError> {
        let mut backings = HashMap::new();
        for config in &self.shared_backends {
            let backing = SharedBacking {
                engine: config.engine,
                endpoint: Endpoint {
                    host: config.host.clone(),
                    port: config.port,
                },
                backend: Arc::new(SqlxSharedBackend::connect_lazy(config)?),
            };
            if backings.insert(config.plan_id.clone(), backing).is_some() {
                return Err(BrokerError::Configuration(format!(
                    "plan {} has more than one shared backing",
                    config.plan_id
                )));
            }
        }
        Ok(backings)
    }
}

enum SharedPool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

/// [`SharedBackend`] over an sqlx pool. Statements go through the simple query protocol, since
/// `CREATE DATABASE` and friends cannot be prepared.
pub struct SqlxSharedBackend {
    pool: SharedPool,
}

impl SqlxSharedBackend {
    pub fn connect_lazy(config: &SharedBackendConfig) -> Result<Self, BrokerError> {
        let pool = match config.engine.sql_dialect() {
            Some(SqlDialect::Postgres) => {
                let mut options = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.username)
                    .password(&config.password)
                    .database(&config.db_name);
                if let Some(mode) = &config.sslmode {
                    let mode = PgSslMode::from_str(mode).map_err(|e| {
                        BrokerError::Configuration(format!(
                            "invalid sslmode for plan {}: {e}",
                            config.plan_id
                        ))
                    })?;
                    options = options.ssl_mode(mode);
                }
                SharedPool::Postgres(
                    PgPoolOptions::new()
                        .max_connections(MAX_CONNECTIONS)
                        .connect_lazy_with(options),
                )
            }
            Some(SqlDialect::MySql) => {
                let mut options = MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.username)
                    .password(&config.password)
                    .database(&config.db_name);
                if let Some(mode) = &config.sslmode {
                    let mode = MySqlSslMode::from_str(mode).map_err(|e| {
                        BrokerError::Configuration(format!(
                            "invalid sslmode for plan {}: {e}",
                            config.plan_id
                        ))
                    })?;
                    options = options.ssl_mode(mode);
                }
                SharedPool::MySql(
                    MySqlPoolOptions::new()
                        .max_connections(MAX_CONNECTIONS)
                        .connect_lazy_with(options),
                )
            }
            None => return Err(BrokerError::UnsupportedEngine(config.engine.to_string())),
        };
        Ok(Self { pool })
    }
}

#[async_trait]
impl SharedBackend for SqlxSharedBackend {
    async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        match &self.pool {
            SharedPool::Postgres(pool) => {
                pool.execute(sql).await?;
            }
            SharedPool::MySql(pool) => {
                pool.execute(sql).await?;
            }
        }
        Ok(())
    }

    async fn probe(&self, sql: &str) -> anyhow::Result<bool> {
        let found = match &self.pool {
            SharedPool::Postgres(pool) => sqlx::query(sql).fetch_optional(pool).await?.is_some(),
            SharedPool::MySql(pool) => sqlx::query(sql).fetch_optional(pool).await?.is_some(),
        };
        Ok(found)
    }
}
