use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shellyfleet_domain::{ErrorKind, Envelope};

/// Every domain error type exposes `kind() -> ErrorKind`; this is the one
/// place that maps a kind to an HTTP status and wraps the message in the
/// standard envelope. Handlers propagate with `?` via the `From` impls
/// below rather than matching on concrete error types.
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ApiError { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ErrorKind::Unauthorized, message)
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Unreachable => StatusCode::BAD_GATEWAY,
            ErrorKind::DeviceAuthRequired => StatusCode::UNAUTHORIZED,
            ErrorKind::ProtocolError => StatusCode::BAD_GATEWAY,
            ErrorKind::TemplateUnsafe => StatusCode::BAD_REQUEST,
            ErrorKind::Corrupt => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: Envelope<()> = Envelope::err(self.kind, self.message, None);
        (status, Json(body)).into_response()
    }
}

/// Implements `From<$ty> for ApiError` for every domain error type that
/// exposes a `kind()` method, so handlers can propagate with `?` uniformly.
macro_rules! impl_from_kinded_error {
    ($ty:path) => {
        impl From<$ty> for ApiError {
            fn from(e: $ty) -> Self {
                ApiError::new(e.kind(), e.to_string())
            }
        }
    };
}

impl_from_kinded_error!(shellyfleet_store::StoreError);
impl_from_kinded_error!(shellyfleet_client::ClientError);
impl_from_kinded_error!(shellyfleet_devicecfg::DeviceCfgError);
impl_from_kinded_error!(shellyfleet_provisioning::ProvisioningError);
impl_from_kinded_error!(shellyfleet_sync::SyncError);
impl_from_kinded_error!(shellyfleet_notify::NotifyError);
impl_from_kinded_error!(shellyfleet_domain::DomainError);
