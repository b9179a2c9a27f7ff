use shellyfleet_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown plugin '{role:?}/{name}'")]
    UnknownPlugin { role: shellyfleet_domain::SyncRole, name: String },

    #[error("invalid plugin config: {0}")]
    InvalidConfig(String),

    #[error("path '{0}' escapes the configured output directory")]
    ForbiddenPath(String),

    #[error("conflict strategy '{0}' is not supported for entity '{1}'")]
    UnsupportedStrategy(String, String),

    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] shellyfleet_store::StoreError),

    #[error(transparent)]
    DeviceCfg(#[from] shellyfleet_devicecfg::DeviceCfgError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::UnknownPlugin { .. } => ErrorKind::NotFound,
            SyncError::InvalidConfig(_) | SyncError::UnsupportedStrategy(_, _) => ErrorKind::Validation,
            SyncError::ForbiddenPath(_) => ErrorKind::Forbidden,
            SyncError::Corrupt(_) => ErrorKind::Corrupt,
            SyncError::Store(e) => e.kind(),
            SyncError::DeviceCfg(e) => e.kind(),
            SyncError::Io(_) | SyncError::Json(_) => ErrorKind::Internal,
        }
    }
}
