//! The persisted description of one provisioned resource.

use crate::crypto::{generate_salt, protect, random_string, reveal, EncryptionKey};
use crate::domain::catalog::PlanDescriptor;
use crate::domain::engine::{EngineFamily, EngineType};
use crate::error::BrokerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const NAME_SUFFIX_LEN: usize = 15;
const PASSWORD_LEN: usize = 25;
const USERNAME_PREFIX: &str = "u";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    NotCreated,
    InProgress,
    Ready,
    Gone,
    NotGone,
}

impl ResourceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::NotCreated => "not_created",
            ResourceState::InProgress => "in_progress",
            ResourceState::Ready => "ready",
            ResourceState::Gone => "gone",
            ResourceState::NotGone => "not_gone",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_created" => Ok(ResourceState::NotCreated),
            "in_progress" => Ok(ResourceState::InProgress),
            "ready" => Ok(ResourceState::Ready),
            "gone" => Ok(ResourceState::Gone),
            "not_gone" => Ok(ResourceState::NotGone),
            other => Err(format!("unknown resource state '{other}'")),
        }
    }
}

/// Which provisioning strategy owns a resource. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Shared,
    Dedicated,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Shared => "shared",
            AdapterKind::Dedicated => "dedicated",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(AdapterKind::Shared),
            "dedicated" => Ok(AdapterKind::Dedicated),
            other => Err(format!("unknown adapter kind '{other}'")),
        }
    }
}

/// Network location of a database server or cache primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// Caller-supplied identity of a new resource.
#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    pub external_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub organization_id: String,
    pub space_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub id: Uuid,
    pub external_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub organization_id: String,
    pub space_id: String,
    pub adapter_kind: AdapterKind,
    pub engine: EngineType,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Generated raw name. Engine rules derive the database name and instance identifier from it.
    pub database: String,
    pub username: String,
    pub encrypted_secret: String,
    pub salt: String,
    pub state: ResourceState,
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// Builds a fresh record for `plan`: generated names, a new salt and a new password,
    /// stored encrypted. Returns the record together with the plaintext password, which is
    /// never kept on the record.
    pub fn provision(
        identity: ResourceIdentity,
        plan: &PlanDescriptor,
        db_prefix: &str,
        key: &EncryptionKey,
    ) -> Result<(Self, String), BrokerError> {
        let now = Utc::now();

        let mut tags = plan.tags.clone();
        tags.insert("Instance GUID".to_string(), identity.external_id.clone());
        tags.insert("Space GUID".to_string(), identity.space_id.clone());
        tags.insert("Organization GUID".to_string(), identity.organization_id.clone());
        tags.insert("Plan GUID".to_string(), identity.plan_id.clone());
        tags.insert("Service GUID".to_string(), identity.service_id.clone());

        let mut record = Self {
            id: Uuid::new_v4(),
            external_id: identity.external_id,
            service_id: identity.service_id,
            plan_id: identity.plan_id,
            organization_id: identity.organization_id,
            space_id: identity.space_id,
            adapter_kind: plan.adapter_kind,
            engine: plan.engine,
            host: None,
            port: None,
            database: format!("{db_prefix}{}", random_string(NAME_SUFFIX_LEN)),
            username: format!("{USERNAME_PREFIX}{}", random_string(NAME_SUFFIX_LEN)),
            encrypted_secret: String::new(),
            salt: generate_salt(),
            state: ResourceState::NotCreated,
            tags,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let password = random_string(PASSWORD_LEN);
        record.store_secret(&password, key)?;
        Ok((record, password))
    }

    pub fn store_secret(&mut self, plaintext: &str, key: &EncryptionKey) -> Result<(), BrokerError> {
        self.encrypted_secret = protect(plaintext, key.as_bytes(), &self.salt)?;
        Ok(())
    }

    pub fn secret(&self, key: &EncryptionKey) -> Result<String, BrokerError> {
        Ok(reveal(&self.encrypted_secret, key.as_bytes(), &self.salt)?)
    }

    /// Database name as used in tenant SQL and in the credential URI.
    pub fn database_name(&self) -> String {
        self.engine.database_name(&self.database)
    }

    /// Identifier of the backing instance in the cloud control plane.
    pub fn instance_identifier(&self) -> String {
        self.engine.instance_identifier(&self.database)
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(Endpoint {
                host: host.clone(),
                port,
            }),
            _ => None,
        }
    }

    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.host = Some(endpoint.host);
        self.port = Some(endpoint.port);
        self.touch();
    }

    pub fn set_state(&mut self, state: ResourceState) {
        self.state = state;
        self.touch();
    }

    pub fn mark_deleted(&mut self) {
        let now = Utc::now();
        self.state = ResourceState::Gone;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Connection details for the bound application.
    pub fn credentials(&self, password: &str) -> Result<Credentials, BrokerError> {
        let endpoint = self.endpoint().ok_or_else(|| {
            BrokerError::InconsistentState(format!(
                "Instance {} has no endpoint yet",
                self.external_id
            ))
        })?;
        let family = self.engine.family();

        if family == EngineFamily::Redis {
            return Ok(Credentials {
                uri: format!(
                    "{}://:{}@{}:{}",
                    family.scheme(),
                    password,
                    endpoint.host,
                    endpoint.port
                ),
                username: None,
                password: password.to_string(),
                host: endpoint.host,
                port: endpoint.port.to_string(),
                db_name: None,
            });
        }

        let db_name = self.database_name();
        Ok(Credentials {
            uri: format!(
                "{}://{}:{}@{}:{}/{}",
                family.scheme(),
                self.username,
                password,
                endpoint.host,
                endpoint.port,
                db_name
            ),
            username: Some(self.username.clone()),
            password: password.to_string(),
            host: endpoint.host,
            port: endpoint.port.to_string(),
            db_name: Some(db_name),
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: String,
    pub host: String,
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("uri", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::catalog::{CacheOptions, PlanDescriptor};

    pub(crate) fn test_key() -> EncryptionKey {
        EncryptionKey::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap()
    }

    pub(crate) fn plan(engine: EngineType, adapter_kind: AdapterKind) -> PlanDescriptor {
        let mut tags = BTreeMap::new();
        tags.insert("environment".to_string(), "test".to_string());
        PlanDescriptor {
            id: "plan-1".into(),
            name: "plan".into(),
            description: "test plan".into(),
            free: true,
            metadata: None,
            service_id: "svc-1".into(),
            adapter_kind,
            engine,
            engine_version: None,
            instance_class: Some("db.t3.micro".into()),
            allocated_storage: 10,
            redundant: false,
            encrypted: true,
            subnet_group: Some("subnets".into()),
            security_group: Some("sg-1".into()),
            tags,
            cache: CacheOptions::default(),
            shared: None,
        }
    }

    pub(crate) fn identity(external_id: &str) -> ResourceIdentity {
        ResourceIdentity {
            external_id: external_id.into(),
            service_id: "svc-1".into(),
            plan_id: "plan-1".into(),
            organization_id: "org-1".into(),
            space_id: "space-1".into(),
        }
    }

    #[test]
    fn provision_generates_names_and_encrypts_the_password() {
        let key = test_key();
        let (record, password) = ResourceRecord::provision(
            identity("inst-1"),
            &plan(EngineType::Postgres, AdapterKind::Dedicated),
            "db",
            &key,
        )
        .unwrap();

        assert!(record.database.starts_with("db"));
        assert_eq!(record.database.len(), 17);
        assert!(record.username.starts_with('u'));
        assert_eq!(record.username.len(), 16);
        assert_eq!(password.len(), 25);
        assert_ne!(record.encrypted_secret, password);
        assert_eq!(record.secret(&key).unwrap(), password);
        assert_eq!(record.state, ResourceState::NotCreated);
        assert!(record.is_live());
    }

    #[test]
    fn provision_merges_identity_tags_over_plan_tags() {
        let (record, _) = ResourceRecord::provision(
            identity("inst-1"),
            &plan(EngineType::Postgres, AdapterKind::Dedicated),
            "db",
            &test_key(),
        )
        .unwrap();

        assert_eq!(record.tags["environment"], "test");
        assert_eq!(record.tags["Instance GUID"], "inst-1");
        assert_eq!(record.tags["Organization GUID"], "org-1");
        assert_eq!(record.tags["Space GUID"], "space-1");
        assert_eq!(record.tags["Plan GUID"], "plan-1");
        assert_eq!(record.tags["Service GUID"], "svc-1");
    }

    #[test]
    fn relational_credentials_use_the_normalised_name() {
        let (mut record, password) = ResourceRecord::provision(
            identity("inst-1"),
            &plan(EngineType::MariaDb, AdapterKind::Shared),
            "db-",
            &test_key(),
        )
        .unwrap();
        record.set_endpoint(Endpoint {
            host: "db.internal".into(),
            port: 3306,
        });

        let creds = record.credentials(&password).unwrap();
        let name = record.database_name();
        assert!(!name.contains('-'));
        assert_eq!(
            creds.uri,
            format!("mysql://{}:{}@db.internal:3306/{}", record.username, password, name)
        );
        assert_eq!(creds.port, "3306");
        assert_eq!(creds.db_name.as_deref(), Some(name.as_str()));
    }

    #[test]
    fn cache_credentials_have_no_username() {
        let (mut record, password) = ResourceRecord::provision(
            identity("inst-2"),
            &plan(EngineType::Redis, AdapterKind::Dedicated),
            "cg",
            &test_key(),
        )
        .unwrap();
        record.set_endpoint(Endpoint {
            host: "cache.internal".into(),
            port: 6379,
        });

        let creds = record.credentials(&password).unwrap();
        assert_eq!(creds.uri, format!("redis://:{password}@cache.internal:6379"));
        assert!(creds.username.is_none());
        assert!(creds.db_name.is_none());
    }

    #[test]
    fn credentials_without_an_endpoint_are_inconsistent() {
        let (record, password) = ResourceRecord::provision(
            identity("inst-3"),
            &plan(EngineType::Postgres, AdapterKind::Dedicated),
            "db",
            &test_key(),
        )
        .unwrap();
        assert!(matches!(
            record.credentials(&password),
            Err(BrokerError::InconsistentState(_))
        ));
    }

    #[test]
    fn credentials_debug_hides_the_password() {
        let (mut record, password) = ResourceRecord::provision(
            identity("inst-4"),
            &plan(EngineType::Postgres, AdapterKind::Shared),
            "db",
            &test_key(),
        )
        .unwrap();
        record.set_endpoint(Endpoint {
            host: "h".into(),
            port: 5432,
        });
        let rendered = format!("{:?}", record.credentials(&password).unwrap());
        assert!(!rendered.contains(&password));
    }

    #[test]
    fn states_round_trip_through_their_stored_names() {
        for state in [
            ResourceState::NotCreated,
            ResourceState::InProgress,
            ResourceState::Ready,
            ResourceState::Gone,
            ResourceState::NotGone,
        ] {
            assert_eq!(state.as_str().parse::<ResourceState>().unwrap(), state);
        }
        assert!("archived".parse::<ResourceState>().is_err());
    }
}
