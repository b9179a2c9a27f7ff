use serde::Serialize;
use thiserror::Error;

/// The shared error taxonomy: kinds, not names. Every crate's typed
/// error exposes a `kind() -> ErrorKind` so the API layer is the only place
/// that maps a kind to an HTTP status and stable JSON code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UnsupportedMedia,
    PayloadTooLarge,
    RateLimited,
    Timeout,
    Unreachable,
    DeviceAuthRequired,
    ProtocolError,
    TemplateUnsafe,
    Corrupt,
    Internal,
}

impl ErrorKind {
    /// Stable string code surfaced in `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::UnsupportedMedia => "UNSUPPORTED_MEDIA",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::RateLimited => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Unreachable => "UNREACHABLE",
            ErrorKind::DeviceAuthRequired => "DEVICE_AUTH_REQUIRED",
            ErrorKind::ProtocolError => "PROTOCOL_ERROR",
            ErrorKind::TemplateUnsafe => "TemplateUnsafe",
            ErrorKind::Corrupt => "CORRUPT",
            ErrorKind::Internal => "Internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid mac address: {0}")]
    InvalidMac(String),

    #[error("invalid page parameters: {0}")]
    InvalidPage(String),

    #[error("{0}")]
    Validation(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidMac(_) | DomainError::InvalidPage(_) | DomainError::Validation(_) => {
                ErrorKind::Validation
            }
        }
    }
}
