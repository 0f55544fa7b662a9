//! Centralized configuration (environment variables + defaults).

use crate::crypto::EncryptionKey;
use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudBackend {
    Aws,
    Simulated,
}

#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Key for secrets at rest (required, 16/24/32 bytes).
    pub encryption_key: EncryptionKey,
    /// Prefix of generated database names.
    pub db_prefix: String,
    pub record_store: RecordStoreKind,
    /// Required when the record store is postgres.
    pub database_url: Option<String>,
    pub cloud_backend: CloudBackend,
    /// Required when the cloud backend is aws.
    pub aws_region: Option<String>,
    pub catalog_path: PathBuf,
    pub secrets_path: PathBuf,
    /// Upper bound (GB) for a plan's allocated storage.
    pub max_allocated_storage: i32,
    pub listen_addr: SocketAddr,
    /// Basic auth on the broker API; disabled when unset.
    pub auth: Option<BasicAuth>,
}

impl Settings {
    /// Reads settings from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let raw_key = var("ENC_KEY").ok_or_else(|| anyhow!("ENC_KEY must be set"))?;
        let encryption_key =
            EncryptionKey::new(raw_key.into_bytes()).context("ENC_KEY is not a valid AES key")?;

        let record_store = match var("RECORD_STORE").as_deref() {
            None | Some("postgres") => RecordStoreKind::Postgres,
            Some("memory") => RecordStoreKind::Memory,
            Some(other) => bail!("RECORD_STORE must be 'postgres' or 'memory', got '{other}'"),
        };
        let database_url = var("DATABASE_URL");
        if record_store == RecordStoreKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when RECORD_STORE is postgres");
        }

        let cloud_backend = match var("CLOUD_BACKEND").as_deref() {
            None | Some("aws") => CloudBackend::Aws,
            Some("simulated") => CloudBackend::Simulated,
            Some(other) => bail!("CLOUD_BACKEND must be 'aws' or 'simulated', got '{other}'"),
        };
        let aws_region = var("AWS_DEFAULT_REGION");
        if cloud_backend == CloudBackend::Aws && aws_region.is_none() {
            bail!("AWS_DEFAULT_REGION must be set when CLOUD_BACKEND is aws");
        }

        let max_allocated_storage = match var("MAX_ALLOCATED_STORAGE") {
            Some(v) => v
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("MAX_ALLOCATED_STORAGE must be a positive integer"))?,
            None => 1024,
        };

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("LISTEN_ADDR must be host:port")?;

        let auth = match (var("AUTH_USER"), var("AUTH_PASS")) {
            (Some(username), Some(password)) => Some(BasicAuth { username, password }),
            (None, None) => None,
            _ => bail!("AUTH_USER and AUTH_PASS must be set together"),
        };

        Ok(Self {
            encryption_key,
            db_prefix: var("DB_PREFIX").unwrap_or_else(|| "db".to_string()),
            record_store,
            database_url,
            cloud_backend,
            aws_region,
            catalog_path: var("CATALOG_PATH")
                .unwrap_or_else(|| "catalog.yaml".to_string())
                .into(),
            secrets_path: var("SECRETS_PATH")
                .unwrap_or_else(|| "secrets.yml".to_string())
                .into(),
            max_allocated_storage,
            listen_addr,
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| env.get(name).cloned())
    }

    const KEY: (&str, &str) = ("ENC_KEY", "0123456789abcdef");

    #[test]
    fn defaults_apply() {
        let s = settings(&[
            KEY,
            ("DATABASE_URL", "postgres://localhost/broker"),
            ("AWS_DEFAULT_REGION", "us-gov-west-1"),
        ])
        .unwrap();
        assert_eq!(s.db_prefix, "db");
        assert_eq!(s.record_store, RecordStoreKind::Postgres);
        assert_eq!(s.cloud_backend, CloudBackend::Aws);
        assert_eq!(s.max_allocated_storage, 1024);
        assert_eq!(s.catalog_path, PathBuf::from("catalog.yaml"));
        assert_eq!(s.listen_addr.port(), 3000);
        assert!(s.auth.is_none());
    }

    #[test]
    fn memory_and_simulated_need_no_urls() {
        let s = settings(&[
            KEY,
            ("RECORD_STORE", "memory"),
            ("CLOUD_BACKEND", "simulated"),
            ("DB_PREFIX", "cg"),
            ("AUTH_USER", "broker"),
            ("AUTH_PASS", "pass"),
        ])
        .unwrap();
        assert_eq!(s.db_prefix, "cg");
        assert_eq!(s.auth.unwrap().username, "broker");
    }

    #[test]
    fn missing_or_bad_values_are_errors() {
        assert!(settings(&[]).is_err());
        assert!(settings(&[("ENC_KEY", "short")]).is_err());
        assert!(settings(&[KEY, ("RECORD_STORE", "memory"), ("CLOUD_BACKEND", "simulated"), ("MAX_ALLOCATED_STORAGE", "-3")]).is_err());
        assert!(settings(&[KEY, ("RECORD_STORE", "memory")]).is_err());
        assert!(settings(&[KEY, ("CLOUD_BACKEND", "simulated")]).is_err());
        assert!(settings(&[KEY, ("RECORD_STORE", "memory"), ("CLOUD_BACKEND", "simulated"), ("AUTH_USER", "only")]).is_err());
    }
}
