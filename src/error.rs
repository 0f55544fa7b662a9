//! Error kinds surfaced by the broker.
//!
//! Every failure that reaches a caller is a [`BrokerError`]. Lower layers (vault, record
//! store, cloud control plane) keep their own small error types and convert into it, so the
//! HTTP layer only has to map one enum to status codes.

use crate::crypto::vault::VaultError;
use crate::infra::cloud::CloudError;
use crate::storage::records::StoreError;
use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed or missing request fields, unknown plan.
    #[error("{0}")]
    Validation(String),

    /// A live record already exists for the external id.
    #[error("{0}")]
    Conflict(String),

    /// Unknown resource or service.
    #[error("{0}")]
    NotFound(String),

    /// Vault misuse, e.g. a record without a salt.
    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Crypto(String),

    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),

    /// The dedicated resource is still provisioning. Callers retry the bind later.
    #[error("{0}")]
    NotReady(String),

    /// The cloud control plane reported something that should not happen.
    #[error("{0}")]
    InconsistentState(String),

    /// An adapter step failed; `cause` is appended to the description.
    #[error("{description}{}", .cause.as_ref().map(|c| format!(" Error: {c}")).unwrap_or_default())]
    Provisioning {
        description: String,
        cause: Option<String>,
    },

    /// Catalog and persisted state disagree (e.g. a plan's adapter kind changed).
    #[error("{0}")]
    Configuration(String),

    #[error("record store failure: {0}")]
    Storage(String),
}

impl BrokerError {
    pub fn provisioning(description: impl Into<String>, cause: impl ToString) -> Self {
        BrokerError::Provisioning {
            description: description.into(),
            cause: Some(cause.to_string()),
        }
    }

    /// Short machine-stable name of the error kind (used in logs).
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::Validation(_) => "validation",
            BrokerError::Conflict(_) => "conflict",
            BrokerError::NotFound(_) => "not_found",
            BrokerError::Precondition(_) => "precondition",
            BrokerError::Crypto(_) => "crypto",
            BrokerError::UnsupportedEngine(_) => "unsupported_engine",
            BrokerError::NotReady(_) => "not_ready",
            BrokerError::InconsistentState(_) => "inconsistent_state",
            BrokerError::Provisioning { .. } => "provisioning",
            BrokerError::Configuration(_) => "configuration",
            BrokerError::Storage(_) => "storage",
        }
    }
}

impl From<VaultError> for BrokerError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Precondition(msg) => BrokerError::Precondition(msg),
            VaultError::Crypto(msg) => BrokerError::Crypto(msg),
        }
    }
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(external_id) => {
                BrokerError::Conflict(format!("The instance {external_id} already exists"))
            }
            other => BrokerError::Storage(other.to_string()),
        }
    }
}

impl From<CloudError> for BrokerError {
    fn from(err: CloudError) -> Self {
        BrokerError::Provisioning {
            description: "The cloud control plane call failed.".to_string(),
            cause: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_description_carries_cause() {
        let err = BrokerError::provisioning("There was an error creating the instance.", "quota");
        assert_eq!(
            err.to_string(),
            "There was an error creating the instance. Error: quota"
        );

        let bare = BrokerError::Provisioning {
            description: "There was an error deleting the instance.".into(),
            cause: None,
        };
        assert_eq!(bare.to_string(), "There was an error deleting the instance.");
    }

    #[test]
    fn duplicate_store_error_is_a_conflict() {
        let err: BrokerError = StoreError::Duplicate("abc".into()).into();
        assert_eq!(err.kind(), "conflict");
    }
}
