use shellyfleet_domain::ErrorKind;
use shellyfleet_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("agent not found: {0}")]
    AgentNotFound(uuid::Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProvisioningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisioningError::InvalidTransition { .. } => ErrorKind::Validation,
            ProvisioningError::TaskNotFound(_) | ProvisioningError::AgentNotFound(_) => ErrorKind::NotFound,
            ProvisioningError::Store(e) => e.kind(),
        }
    }
}
