//! Engine-specific rules: URI schemes, resource naming and shared-tenant SQL.
//!
//! Naming goes through [`EngineType::database_name`] and [`EngineType::instance_identifier`]
//! both when a resource is created and when its credentials are built, so the two can never
//! diverge.

use crate::error::BrokerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL Server on RDS does not take a database name at creation; clients connect to `master`.
pub const SQLSERVER_SYSTEM_DATABASE: &str = "master";

const ORACLE_NAME_MAX: usize = 8;
const INSTANCE_IDENTIFIER_MAX: usize = 63;
const CACHE_CLUSTER_ID_MAX: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "mariadb")]
    MariaDb,
    #[serde(rename = "aurora")]
    Aurora,
    #[serde(rename = "oracle-se1")]
    OracleSe1,
    #[serde(rename = "oracle-se")]
    OracleSe,
    #[serde(rename = "oracle-ee")]
    OracleEe,
    #[serde(rename = "sqlserver-ee")]
    SqlServerEe,
    #[serde(rename = "sqlserver-se")]
    SqlServerSe,
    #[serde(rename = "sqlserver-ex")]
    SqlServerEx,
    #[serde(rename = "sqlserver-web")]
    SqlServerWeb,
    #[serde(rename = "redis")]
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFamily {
    Postgres,
    MySql,
    Oracle,
    SqlServer,
    Redis,
}

impl EngineFamily {
    /// Scheme used in credential URIs.
    pub fn scheme(self) -> &'static str {
        match self {
            EngineFamily::Postgres => "postgres",
            EngineFamily::MySql => "mysql",
            EngineFamily::Oracle => "oracle",
            EngineFamily::SqlServer => "sqlserver",
            EngineFamily::Redis => "redis",
        }
    }
}

impl EngineType {
    /// Engine name as understood by the cloud control plane and the catalog.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineType::Postgres => "postgres",
            EngineType::MySql => "mysql",
            EngineType::MariaDb => "mariadb",
            EngineType::Aurora => "aurora",
            EngineType::OracleSe1 => "oracle-se1",
            EngineType::OracleSe => "oracle-se",
            EngineType::OracleEe => "oracle-ee",
            EngineType::SqlServerEe => "sqlserver-ee",
            EngineType::SqlServerSe => "sqlserver-se",
            EngineType::SqlServerEx => "sqlserver-ex",
            EngineType::SqlServerWeb => "sqlserver-web",
            EngineType::Redis => "redis",
        }
    }

    pub fn family(self) -> EngineFamily {
        match self {
            EngineType::Postgres => EngineFamily::Postgres,
            EngineType::MySql | EngineType::MariaDb | EngineType::Aurora => EngineFamily::MySql,
            EngineType::OracleSe1 | EngineType::OracleSe | EngineType::OracleEe => {
                EngineFamily::Oracle
            }
            EngineType::SqlServerEe
            | EngineType::SqlServerSe
            | EngineType::SqlServerEx
            | EngineType::SqlServerWeb => EngineFamily::SqlServer,
            EngineType::Redis => EngineFamily::Redis,
        }
    }

    pub fn is_cache(self) -> bool {
        self.family() == EngineFamily::Redis
    }

    /// Statement templates for tenants on a shared backing instance, if the engine has any.
    pub fn sql_dialect(self) -> Option<SqlDialect> {
        match self.family() {
            EngineFamily::Postgres => Some(SqlDialect::Postgres),
            EngineFamily::MySql => Some(SqlDialect::MySql),
            _ => None,
        }
    }

    /// Whether the control plane accepts an initial database name for this engine.
    pub fn accepts_database_name(self) -> bool {
        !matches!(
            self.family(),
            EngineFamily::SqlServer | EngineFamily::Redis
        )
    }

    /// Database name used in tenant SQL and in credential URIs.
    ///
    /// Relational engines drop anything outside `[A-Za-z0-9_]` (hyphens in particular).
    /// Oracle is limited to 8 alphanumeric characters. SQL Server ignores the generated name.
    pub fn database_name(self, raw: &str) -> String {
        match self.family() {
            EngineFamily::SqlServer => SQLSERVER_SYSTEM_DATABASE.to_string(),
            EngineFamily::Oracle => raw
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(ORACLE_NAME_MAX)
                .collect(),
            EngineFamily::Postgres | EngineFamily::MySql | EngineFamily::Redis => raw
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect(),
        }
    }

    /// Identifier of the dedicated instance (or replication group) in the control plane.
    pub fn instance_identifier(self, raw: &str) -> String {
        let max = if self.is_cache() {
            CACHE_CLUSTER_ID_MAX
        } else {
            INSTANCE_IDENTIFIER_MAX
        };

        let mut id = String::with_capacity(raw.len());
        for c in raw.chars().map(|c| c.to_ascii_lowercase()) {
            if c.is_ascii_alphanumeric() {
                id.push(c);
            } else if (c == '-' || c == '_') && !id.is_empty() && !id.ends_with('-') {
                id.push('-');
            }
        }
        id.truncate(max);
        while id.ends_with('-') {
            id.pop();
        }
        id
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let engine = match s.trim().to_lowercase().as_str() {
            "postgres" => EngineType::Postgres,
            "mysql" => EngineType::MySql,
            "mariadb" => EngineType::MariaDb,
            "aurora" => EngineType::Aurora,
            "oracle-se1" => EngineType::OracleSe1,
            "oracle-se" => EngineType::OracleSe,
            "oracle-ee" => EngineType::OracleEe,
            "sqlserver-ee" => EngineType::SqlServerEe,
            "sqlserver-se" => EngineType::SqlServerSe,
            "sqlserver-ex" => EngineType::SqlServerEx,
            "sqlserver-web" => EngineType::SqlServerWeb,
            "redis" => EngineType::Redis,
            other => return Err(BrokerError::UnsupportedEngine(other.to_string())),
        };
        Ok(engine)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    MySql,
}

/// One statement against a shared backing instance.
///
/// When `guard` is set it is run first and the statement is skipped if the guard returns a row,
/// which makes steps without a native `IF NOT EXISTS` safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantStatement {
    pub label: &'static str,
    pub guard: Option<String>,
    pub sql: String,
}

impl TenantStatement {
    fn new(label: &'static str, sql: String) -> Self {
        Self {
            label,
            guard: None,
            sql,
        }
    }

    fn guarded(label: &'static str, guard: String, sql: String) -> Self {
        Self {
            label,
            guard: Some(guard),
            sql,
        }
    }
}

impl SqlDialect {
    /// Create database, create principal, grant. In that order.
    pub fn create_tenant(
        self,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<TenantStatement>, BrokerError> {
        check_ident(database)?;
        check_ident(username)?;

        let statements = match self {
            SqlDialect::Postgres => {
                let password = password.replace('\'', "''");
                vec![
                    TenantStatement::guarded(
                        "create database",
                        format!("SELECT 1 FROM pg_database WHERE datname = '{database}'"),
                        format!("CREATE DATABASE \"{database}\""),
                    ),
                    TenantStatement::guarded(
                        "create principal",
                        format!("SELECT 1 FROM pg_roles WHERE rolname = '{username}'"),
                        format!("CREATE USER \"{username}\" WITH PASSWORD '{password}'"),
                    ),
                    TenantStatement::new(
                        "grant privileges",
                        format!("GRANT ALL PRIVILEGES ON DATABASE \"{database}\" TO \"{username}\""),
                    ),
                ]
            }
            SqlDialect::MySql => {
                let password = password.replace('\\', "\\\\").replace('\'', "''");
                vec![
                    TenantStatement::new(
                        "create database",
                        format!("CREATE DATABASE IF NOT EXISTS `{database}`"),
                    ),
                    // '%' is the MySQL wildcard host.
                    TenantStatement::new(
                        "create principal",
                        format!(
                            "CREATE USER IF NOT EXISTS '{username}'@'%' IDENTIFIED BY '{password}'"
                        ),
                    ),
                    TenantStatement::new(
                        "grant privileges",
                        format!("GRANT ALL ON `{database}`.* TO '{username}'@'%'"),
                    ),
                ]
            }
        };
        Ok(statements)
    }

    /// Drop database, then the principal that held privileges on it.
    pub fn drop_tenant(
        self,
        database: &str,
        username: &str,
    ) -> Result<Vec<TenantStatement>, BrokerError> {
        check_ident(database)?;
        check_ident(username)?;

        let statements = match self {
            SqlDialect::Postgres => vec![
                TenantStatement::new(
                    "drop database",
                    format!("DROP DATABASE IF EXISTS \"{database}\""),
                ),
                TenantStatement::new(
                    "drop principal",
                    format!("DROP USER IF EXISTS \"{username}\""),
                ),
            ],
            SqlDialect::MySql => vec![
                TenantStatement::new(
                    "drop database",
                    format!("DROP DATABASE IF EXISTS `{database}`"),
                ),
                TenantStatement::new(
                    "drop principal",
                    format!("DROP USER IF EXISTS '{username}'@'%'"),
                ),
            ],
        };
        Ok(statements)
    }
}

pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_ident(ident: &str) -> Result<(), BrokerError> {
    if validate_ident(ident) {
        Ok(())
    } else {
        Err(BrokerError::Validation(format!(
            "'{ident}' is not a valid database identifier"
        )))
    }
}
