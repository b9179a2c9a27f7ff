use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientError;

/// Per-generation wire client. Implemented by [`crate::gen1::Gen1Client`]
/// and [`crate::gen2::Gen2Client`]; dispatched by [`crate::registry::ClientRegistry`].
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn get_info(&self, ip: std::net::Ipv4Addr) -> Result<Value, ClientError>;
    async fn get_settings(&self, ip: std::net::Ipv4Addr) -> Result<Value, ClientError>;
    async fn put_settings(&self, ip: std::net::Ipv4Addr, settings: &Value) -> Result<Value, ClientError>;
    async fn get_status(&self, ip: std::net::Ipv4Addr) -> Result<Value, ClientError>;
    async fn reboot(&self, ip: std::net::Ipv4Addr) -> Result<(), ClientError>;
}

/// Optional HTTP basic/digest credentials a caller may attach to a call.
#[derive(Debug, Clone, Default)]
pub struct DeviceAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Normalizes an empty response body to an empty JSON object.
pub fn normalize_body(bytes: &[u8]) -> Result<Value, ClientError> {
    if bytes.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(bytes).map_err(|e| ClientError::ProtocolError(e.to_string()))
}
