use shellyfleet_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("unknown channel type '{0}'")]
    UnknownChannelType(String),

    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    #[error("delivery rate-limited for rule '{0}'")]
    RateLimited(uuid::Uuid),

    #[error("transport error delivering to channel '{0}': {1}")]
    Transport(uuid::Uuid, String),

    #[error(transparent)]
    Store(#[from] shellyfleet_store::StoreError),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::UnknownChannelType(_) | NotifyError::InvalidConfig(_) => ErrorKind::Validation,
            NotifyError::RateLimited(_) => ErrorKind::RateLimited,
            NotifyError::Transport(_, _) => ErrorKind::Internal,
            NotifyError::Store(e) => e.kind(),
        }
    }
}
