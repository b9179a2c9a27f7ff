use shellyfleet_domain::ErrorKind;
use thiserror::Error;

/// Failure kinds specific to the device wire protocols, one-to-one with the shared taxonomy.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("device requires authentication")]
    AuthRequired,

    #[error("device authentication failed")]
    AuthFailed,

    #[error("device protocol error: {0}")]
    ProtocolError(String),

    #[error("device call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Unreachable(_) => ErrorKind::Unreachable,
            ClientError::AuthRequired => ErrorKind::DeviceAuthRequired,
            ClientError::AuthFailed => ErrorKind::DeviceAuthRequired,
            ClientError::ProtocolError(_) => ErrorKind::ProtocolError,
            ClientError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}
