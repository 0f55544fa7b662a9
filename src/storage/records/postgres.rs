use super::{RecordStore, StoreError};
use crate::domain::record::ResourceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const SELECT_COLUMNS: &str = "id, external_id, service_id, plan_id, organization_id, space_id, \
    adapter_kind, engine, host, port, database_name, username, encrypted_secret, salt, state, \
    tags, created_at, updated_at, deleted_at";

/// Record store backed by the `resource_records` table.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::new(pool).await
    }

    /// Wraps an existing pool and makes sure the table exists.
    pub async fn new(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS resource_records (
                id UUID PRIMARY KEY,
                external_id TEXT NOT NULL,
                service_id TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                organization_id TEXT NOT NULL,
                space_id TEXT NOT NULL,
                adapter_kind TEXT NOT NULL,
                engine TEXT NOT NULL,
                host TEXT,
                port INTEGER,
                database_name TEXT NOT NULL,
                username TEXT NOT NULL,
                encrypted_secret TEXT NOT NULL,
                salt TEXT NOT NULL,
                state TEXT NOT NULL,
                tags JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ
            )",
        )
        .execute(&pool)
        .await?;

        // Only live records compete for an external id.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS resource_records_live_external_id
             ON resource_records (external_id) WHERE deleted_at IS NULL",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO resource_records (
                id, external_id, service_id, plan_id, organization_id, space_id,
                adapter_kind, engine, host, port, database_name, username,
                encrypted_secret, salt, state, tags, created_at, updated_at, deleted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(record.id)
        .bind(&record.external_id)
        .bind(&record.service_id)
        .bind(&record.plan_id)
        .bind(&record.organization_id)
        .bind(&record.space_id)
        .bind(record.adapter_kind.as_str())
        .bind(record.engine.as_str())
        .bind(&record.host)
        .bind(record.port.map(i32::from))
        .bind(&record.database)
        .bind(&record.username)
        .bind(&record.encrypted_secret)
        .bind(&record.salt)
        .bind(record.state.as_str())
        .bind(Json(&record.tags))
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::Duplicate(record.external_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_live(&self, external_id: &str) -> Result<Option<ResourceRecord>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM resource_records
             WHERE external_id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn update(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE resource_records
             SET host = $2, port = $3, encrypted_secret = $4, state = $5, tags = $6,
                 updated_at = $7, deleted_at = $8
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(&record.host)
        .bind(record.port.map(i32::from))
        .bind(&record.encrypted_secret)
        .bind(record.state.as_str())
        .bind(Json(&record.tags))
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(record.id.to_string()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(row: &PgRow) -> Result<ResourceRecord, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.to_string(),
        reason,
    };

    let adapter_kind: String = row.try_get("adapter_kind")?;
    let engine: String = row.try_get("engine")?;
    let state: String = row.try_get("state")?;
    let port: Option<i32> = row.try_get("port")?;
    let Json(tags): Json<BTreeMap<String, String>> = row.try_get("tags")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;

    Ok(ResourceRecord {
        id,
        external_id: row.try_get("external_id")?,
        service_id: row.try_get("service_id")?,
        plan_id: row.try_get("plan_id")?,
        organization_id: row.try_get("organization_id")?,
        space_id: row.try_get("space_id")?,
        adapter_kind: adapter_kind.parse().map_err(corrupt)?,
        engine: engine.parse().map_err(|e| corrupt(format!("{e}")))?,
        host: row.try_get("host")?,
        port: port
            .map(u16::try_from)
            .transpose()
            .map_err(|_| corrupt(format!("port {port:?} out of range")))?,
        database: row.try_get("database_name")?,
        username: row.try_get("username")?,
        encrypted_secret: row.try_get("encrypted_secret")?,
        salt: row.try_get("salt")?,
        state: state.parse().map_err(corrupt)?,
        tags,
        created_at,
        updated_at,
        deleted_at,
    })
}
