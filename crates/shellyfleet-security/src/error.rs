use shellyfleet_domain::ErrorKind;
use thiserror::Error;

/// Failures produced by the middleware chain. Each stage returns one
/// of these; `middleware::*` turns them into an HTTP response before the
/// handler is ever reached.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("too many headers ({0})")]
    TooManyHeaders(usize),

    #[error("header '{0}' exceeds the size limit")]
    HeaderTooLarge(String),

    #[error("header '{0}' is not permitted")]
    ForbiddenHeader(String),

    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("json nesting exceeds the maximum depth")]
    JsonTooDeep,

    #[error("json array exceeds the maximum length")]
    JsonArrayTooLong,

    #[error("query parameter uses a forbidden key '{0}'")]
    ForbiddenKey(String),

    #[error("request rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("client ip is blocked until {0}")]
    Blocked(chrono::DateTime<chrono::Utc>),
}

impl SecurityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurityError::TooManyHeaders(_)
            | SecurityError::HeaderTooLarge(_)
            | SecurityError::ForbiddenHeader(_) => ErrorKind::Validation,
            SecurityError::UnsupportedContentType(_) => ErrorKind::UnsupportedMedia,
            SecurityError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            SecurityError::JsonTooDeep | SecurityError::JsonArrayTooLong | SecurityError::ForbiddenKey(_) => {
                ErrorKind::Validation
            }
            SecurityError::RateLimited { .. } => ErrorKind::RateLimited,
            SecurityError::Blocked(_) => ErrorKind::Forbidden,
        }
    }
}
