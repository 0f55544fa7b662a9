use crate::domain::adapter::shared::SharedBackend;
use crate::domain::catalog::{CacheOptions, Catalog, CatalogListing, ServiceFamily};
use crate::domain::engine::EngineType;
use crate::domain::record::{AdapterKind, Endpoint};
use crate::error::BrokerError;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A pre-provisioned server that shared plans place tenants on.
#[derive(Clone)]
pub struct SharedBacking {
    pub engine: EngineType,
    pub endpoint: Endpoint,
    pub backend: Arc<dyn SharedBackend>,
}

impl fmt::Debug for SharedBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBacking")
            .field("engine", &self.engine)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Everything needed to provision one plan. Read-only once the resolver is built.
#[derive(Debug, Clone)]
pub struct PlanDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
    pub metadata: Option<JsonValue>,
    pub service_id: String,
    pub adapter_kind: AdapterKind,
    pub engine: EngineType,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage: i32,
    pub redundant: bool,
    pub encrypted: bool,
    pub subnet_group: Option<String>,
    pub security_group: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub cache: CacheOptions,
    /// Set for shared plans only.
    pub shared: Option<SharedBacking>,
}

struct ServiceEntry {
    family: ServiceFamily,
    plans: HashMap<String, PlanDescriptor>,
}

/// Maps `(service_id, plan_id)` to a [`PlanDescriptor`].
///
/// Built once at startup from the catalog and the shared backings (keyed by plan id); every
/// plan is validated up front so that requests never see a half-configured plan.
pub struct PlanResolver {
    catalog: Catalog,
    services: HashMap<String, ServiceEntry>,
}

impl PlanResolver {
    pub fn new(
        catalog: Catalog,
        mut backings: HashMap<String, SharedBacking>,
        max_allocated_storage: i32,
    ) -> Result<Self, BrokerError> {
        let mut services = HashMap::new();

        for service in &catalog.services {
            let mut plans = HashMap::new();
            for spec in &service.plans {
                let engine_is_cache = spec.engine.is_cache();
                if engine_is_cache != (service.family == ServiceFamily::Cache) {
                    return Err(BrokerError::Configuration(format!(
                        "plan {} uses engine {} which does not belong to service {}",
                        spec.id, spec.engine, service.id
                    )));
                }
                if spec.allocated_storage <= 0 || spec.allocated_storage > max_allocated_storage {
                    return Err(BrokerError::Configuration(format!(
                        "plan {} requests {} GB of storage, allowed range is 1..={}",
                        spec.id, spec.allocated_storage, max_allocated_storage
                    )));
                }

                let shared = match spec.adapter {
                    AdapterKind::Shared => {
                        if spec.engine.sql_dialect().is_none() {
                            return Err(BrokerError::UnsupportedEngine(format!(
                                "{} cannot be offered by shared plan {}",
                                spec.engine, spec.id
                            )));
                        }
                        let backing = backings.remove(&spec.id).ok_or_else(|| {
                            BrokerError::Configuration(format!(
                                "shared plan {} has no backing instance configured",
                                spec.id
                            ))
                        })?;
                        if backing.engine.sql_dialect() != spec.engine.sql_dialect() {
                            return Err(BrokerError::Configuration(format!(
                                "shared plan {} is {} but its backing instance is {}",
                                spec.id, spec.engine, backing.engine
                            )));
                        }
                        Some(backing)
                    }
                    AdapterKind::Dedicated => {
                        if spec.instance_class.as_deref().map_or(true, str::is_empty) {
                            return Err(BrokerError::Configuration(format!(
                                "dedicated plan {} has no instance class",
                                spec.id
                            )));
                        }
                        None
                    }
                };

                let descriptor = PlanDescriptor {
                    id: spec.id.clone(),
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    free: spec.free,
                    metadata: spec.metadata.clone(),
                    service_id: service.id.clone(),
                    adapter_kind: spec.adapter,
                    engine: spec.engine,
                    engine_version: spec.engine_version.clone(),
                    instance_class: spec.instance_class.clone(),
                    allocated_storage: spec.allocated_storage,
                    redundant: spec.redundant,
                    encrypted: spec.encrypted,
                    subnet_group: spec.subnet_group.clone(),
                    security_group: spec.security_group.clone(),
                    tags: spec.tags.clone(),
                    cache: spec.cache.clone(),
                    shared,
                };
                if plans.insert(spec.id.clone(), descriptor).is_some() {
                    return Err(BrokerError::Configuration(format!(
                        "plan {} is declared twice in service {}",
                        spec.id, service.id
                    )));
                }
            }

            let entry = ServiceEntry {
                family: service.family,
                plans,
            };
            if services.insert(service.id.clone(), entry).is_some() {
                return Err(BrokerError::Configuration(format!(
                    "service {} is declared twice",
                    service.id
                )));
            }
        }

        if !backings.is_empty() {
            let mut orphans: Vec<_> = backings.into_keys().collect();
            orphans.sort();
            tracing::warn!(plans = ?orphans, "shared backings configured for unknown plans");
        }

        Ok(Self { catalog, services })
    }

    pub fn resolve(&self, service_id: &str, plan_id: &str) -> Result<&PlanDescriptor, BrokerError> {
        let service = self
            .services
            .get(service_id)
            .ok_or_else(|| BrokerError::NotFound(format!("Service {service_id} not found")))?;
        service.plans.get(plan_id).ok_or_else(|| {
            BrokerError::Validation(format!(
                "Plan {plan_id} is not offered by service {service_id}"
            ))
        })
    }

    pub fn family(&self, service_id: &str) -> Option<ServiceFamily> {
        self.services.get(service_id).map(|s| s.family)
    }

    /// Service ids in catalog order.
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.catalog.services.iter().map(|s| s.id.as_str())
    }

    /// Shared plans and their backing, for connectivity checks.
    pub fn shared_backings(&self) -> impl Iterator<Item = (&PlanDescriptor, &SharedBacking)> {
        self.services
            .values()
            .flat_map(|s| s.plans.values())
            .filter_map(|p| p.shared.as_ref().map(|b| (p, b)))
    }

    pub fn listing(&self) -> CatalogListing {
        self.catalog.listing()
    }
}
