//! Service catalog: offerings and plans as loaded from `catalog.yaml`.
//!
//! Plans carry provisioning fields (adapter, engine, sizing) that are read from the file but
//! never rendered by the catalog listing; [`Catalog::listing`] produces the public view.

pub mod resolver;

pub use resolver::{PlanDescriptor, PlanResolver, SharedBacking};

use crate::domain::engine::EngineType;
use crate::domain::record::AdapterKind;
use crate::error::BrokerError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_ALLOCATED_STORAGE: i32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub services: Vec<ServiceOffering>,
}

/// The kind of resources a service hands out. One broker serves each family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceFamily {
    Relational,
    Cache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub bindable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    pub family: ServiceFamily,
    pub plans: Vec<PlanSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    pub adapter: AdapterKind,
    #[serde(rename = "dbType")]
    pub engine: EngineType,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub instance_class: Option<String>,
    #[serde(default = "default_allocated_storage")]
    pub allocated_storage: i32,
    #[serde(default)]
    pub redundant: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub subnet_group: Option<String>,
    #[serde(default)]
    pub security_group: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub cache: CacheOptions,
}

/// Replication group settings for cache plans.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    #[serde(default = "default_cache_clusters")]
    pub num_cache_clusters: i32,
    #[serde(default)]
    pub parameter_group: Option<String>,
    #[serde(default)]
    pub maintenance_window: Option<String>,
    #[serde(default)]
    pub snapshot_window: Option<String>,
    #[serde(default)]
    pub snapshot_retention_limit: Option<i32>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            num_cache_clusters: default_cache_clusters(),
            parameter_group: None,
            maintenance_window: None,
            snapshot_window: None,
            snapshot_retention_limit: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_allocated_storage() -> i32 {
    DEFAULT_ALLOCATED_STORAGE
}

fn default_cache_clusters() -> i32 {
    1
}

impl Catalog {
    pub fn from_yaml_str(raw: &str) -> Result<Self, BrokerError> {
        serde_yaml::from_str(raw)
            .map_err(|e| BrokerError::Configuration(format!("invalid catalog: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, BrokerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::Configuration(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn service(&self, service_id: &str) -> Option<&ServiceOffering> {
        self.services.iter().find(|s| s.id == service_id)
    }

    /// Public catalog as rendered by `GET /v2/catalog`.
    pub fn listing(&self) -> CatalogListing {
        CatalogListing {
            services: self
                .services
                .iter()
                .map(|s| ServiceListing {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    description: s.description.clone(),
                    bindable: s.bindable,
                    plan_updateable: false,
                    tags: s.tags.clone(),
                    metadata: s.metadata.clone(),
                    plans: s
                        .plans
                        .iter()
                        .map(|p| PlanListing {
                            id: p.id.clone(),
                            name: p.name.clone(),
                            description: p.description.clone(),
                            free: p.free,
                            metadata: p.metadata.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogListing {
    pub services: Vec<ServiceListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceListing {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub plans: Vec<PlanListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanListing {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}
