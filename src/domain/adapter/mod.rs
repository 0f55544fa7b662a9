//! Provisioning strategies. A plan picks exactly one, and the choice is stored on the record.

pub mod dedicated;
pub mod shared;

pub use dedicated::{observe_instance, DedicatedAdapter};
pub use shared::{SharedAdapter, SharedBackend};

use crate::domain::catalog::PlanDescriptor;
use crate::domain::record::{AdapterKind, Credentials, ResourceRecord, ResourceState};
use crate::error::BrokerError;
use crate::infra::cloud::ControlPlane;

pub enum ProvisioningAdapter<'a> {
    Shared(SharedAdapter<'a>),
    Dedicated(DedicatedAdapter<'a>),
}

impl<'a> ProvisioningAdapter<'a> {
    pub fn for_plan(
        plan: &'a PlanDescriptor,
        control_plane: &'a dyn ControlPlane,
    ) -> Result<Self, BrokerError> {
        Ok(match plan.adapter_kind {
            AdapterKind::Shared => ProvisioningAdapter::Shared(SharedAdapter::new(plan)?),
            AdapterKind::Dedicated => {
                ProvisioningAdapter::Dedicated(DedicatedAdapter::new(plan, control_plane))
            }
        })
    }

    /// On error nothing usable was created and the record stays `NotCreated`.
    pub async fn create(
        &self,
        record: &mut ResourceRecord,
        secret: &str,
    ) -> Result<ResourceState, BrokerError> {
        match self {
            ProvisioningAdapter::Shared(a) => a.create(record, secret).await,
            ProvisioningAdapter::Dedicated(a) => a.create(record, secret).await,
        }
    }

    pub async fn bind(
        &self,
        record: &mut ResourceRecord,
        secret: &str,
    ) -> Result<Credentials, BrokerError> {
        match self {
            ProvisioningAdapter::Shared(a) => a.bind(record, secret),
            ProvisioningAdapter::Dedicated(a) => a.bind(record, secret).await,
        }
    }

    /// On error the record is left `NotGone`.
    pub async fn delete(&self, record: &mut ResourceRecord) -> Result<ResourceState, BrokerError> {
        match self {
            ProvisioningAdapter::Shared(a) => a.delete(record).await,
            ProvisioningAdapter::Dedicated(a) => a.delete(record).await,
        }
    }
}
