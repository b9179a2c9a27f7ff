use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::client::{normalize_body, DeviceAuth, DeviceClient};
use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON-RPC 2.0 client for Gen2+ devices. Gen2+ has no Basic/Digest
/// challenge of its own in this engine's simplified wire model; `auth`, if
/// present, is sent as a bearer-style `Authorization` header for devices
/// fronted by a gateway that requires one.
pub struct Gen2Client {
    http: Client,
    auth: DeviceAuth,
    timeout: Duration,
}

impl Gen2Client {
    pub fn new(auth: DeviceAuth) -> Self {
        Gen2Client {
            http: Client::builder().timeout(DEFAULT_TIMEOUT).build().expect("reqwest client"),
            auth,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn rpc(&self, ip: Ipv4Addr, method: &str, params: Value) -> Result<Value, ClientError> {
        let url = format!("http://{ip}/rpc");
        let body = json!({
                "id": Uuid::new_v4().to_string(),
                "src": "shellyfleet-manager",
                "method": method,
                "params": params,
        });

        let send_once = || {
            let mut req = self.http.post(&url).timeout(self.timeout).json(&body);
            if let (Some(_), Some(pw)) = (&self.auth.username, &self.auth.password) {
                req = req.bearer_auth(pw);
            }
            req
        };

        let resp = match send_once().send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_request() => {
                send_once().send().await.map_err(map_reqwest_err(self.timeout))?
            }
            Err(e) => return Err(map_reqwest_err(self.timeout)(e)),
        };

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(ClientError::AuthRequired),
            StatusCode::FORBIDDEN => return Err(ClientError::AuthFailed),
            s if !s.is_success() => {
                return Err(ClientError::ProtocolError(format!("gen2 http {s}")))
            }
            _ => {}
        }

        let bytes = resp.bytes().await.map_err(map_reqwest_err(self.timeout))?;
        let envelope = normalize_body(&bytes)?;
        if let Some(err) = envelope.get("error") {
            return Err(ClientError::ProtocolError(err.to_string()));
        }
        Ok(envelope.get("result").cloned().unwrap_or(json!({})))
    }
}

fn map_reqwest_err(timeout: Duration) -> impl Fn(reqwest::Error) -> ClientError {
    move |e| {
        if e.is_timeout() {
            ClientError::Timeout(timeout)
        } else if e.is_connect() {
            ClientError::Unreachable(e.to_string())
        } else {
            ClientError::ProtocolError(e.to_string())
        }
    }
}

#[async_trait]
impl DeviceClient for Gen2Client {
    async fn get_info(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.rpc(ip, "Shelly.GetDeviceInfo", json!({})).await
    }

    async fn get_settings(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.rpc(ip, "Shelly.GetConfig", json!({})).await
    }

    async fn put_settings(&self, ip: Ipv4Addr, settings: &Value) -> Result<Value, ClientError> {
        self.rpc(ip, "Shelly.SetConfig", settings.clone()).await
    }

    async fn get_status(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.rpc(ip, "Shelly.GetStatus", json!({})).await
    }

    async fn reboot(&self, ip: Ipv4Addr) -> Result<(), ClientError> {
        self.rpc(ip, "Shelly.Reboot", json!({})).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn v4(server: &MockServer) -> Ipv4Addr {
        match server.address().ip() {
            std::net::IpAddr::V4(v4) => v4,
            _ => panic!("expected v4"),
        }
    }

    #[tokio::test]
    async fn rpc_result_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "id": "1", "src": "shelly", "result": {"ssid": "home-net"}
        })))
        .mount(&server)
        .await;

        let client = Gen2Client::new(DeviceAuth::default());
        let result = client.get_settings(v4(&server)).await.unwrap();
        assert_eq!(result["ssid"], "home-net");
    }

    #[tokio::test]
    async fn rpc_error_field_maps_to_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "id": "1", "error": {"code": -103, "message": "invalid argument"}
        })))
        .mount(&server)
        .await;

        let client = Gen2Client::new(DeviceAuth::default());
        let err = client.get_settings(v4(&server)).await.unwrap_err();
        assert!(matches!(err, ClientError::ProtocolError(_)));
    }
}
