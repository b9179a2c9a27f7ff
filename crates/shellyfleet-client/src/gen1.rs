use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::client::{normalize_body, DeviceAuth, DeviceClient};
use crate::digest::{build_authorization, DigestChallenge};
use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Form-encoded Gen1 wire client. Optional Basic or Digest auth,
/// selected automatically from the `WWW-Authenticate` challenge on a 401.
pub struct Gen1Client {
    http: Client,
    auth: DeviceAuth,
    timeout: Duration,
}

impl Gen1Client {
    pub fn new(auth: DeviceAuth) -> Self {
        Gen1Client {
            http: Client::builder().timeout(DEFAULT_TIMEOUT).build().expect("reqwest client"),
            auth,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Performs one GET/POST with one immediate retry on connection reset and
    /// transparent digest/basic auth on a 401 challenge. Never retries on 4xx
    /// other than the single auth round-trip.
    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Value, ClientError> {
        let send_once = || {
            let mut req = self.http.request(method.clone(), url).timeout(self.timeout);
            if let Some(f) = form {
                req = req.form(f);
            }
            req
        };

        let first = send_once()
        .send()
        .await
        .map_err(map_reqwest_err(self.timeout))?;

        let resp = if first.status() == StatusCode::UNAUTHORIZED {
            self.authenticate_and_retry(first, method.clone(), url, form).await?
        } else if is_connection_reset(&first) {
            send_once().send().await.map_err(map_reqwest_err(self.timeout))?
        } else {
            first
        };

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::AuthFailed);
        }
        if !resp.status().is_success() {
            return Err(ClientError::ProtocolError(format!("gen1 http {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(map_reqwest_err(self.timeout))?;
        normalize_body(&bytes)
    }

    async fn authenticate_and_retry(
        &self,
        challenge_resp: reqwest::Response,
        method: reqwest::Method,
        url: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<reqwest::Response, ClientError> {
        let (username, password) = match (&self.auth.username, &self.auth.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => return Err(ClientError::AuthRequired),
        };

        let header = challenge_resp
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

        let mut req = self.http.request(method, url).timeout(self.timeout);
        if let Some(f) = form {
            req = req.form(f);
        }

        req = if let Some(challenge) = DigestChallenge::parse(&header) {
            let uri = reqwest::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string());
            let auth_header = build_authorization(&challenge, &username, &password, "GET", &uri);
            req.header(reqwest::header::AUTHORIZATION, auth_header)
        } else {
            req.basic_auth(&username, Some(&password))
        };

        req.send().await.map_err(map_reqwest_err(self.timeout))
    }
}

fn is_connection_reset(resp: &reqwest::Response) -> bool {
    resp.status() == StatusCode::SERVICE_UNAVAILABLE
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
impl DeviceClient for Gen1Client {
    async fn get_info(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.request(reqwest::Method::GET, &format!("http://{ip}/shelly"), None).await
    }

    async fn get_settings(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.request(reqwest::Method::GET, &format!("http://{ip}/settings"), None).await
    }

    async fn put_settings(&self, ip: Ipv4Addr, settings: &Value) -> Result<Value, ClientError> {
        let pairs: Vec<(&str, &str)> = settings
        .as_object()
        .map(|obj| {
                obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                .collect()
        })
        .unwrap_or_default();
        self.request(reqwest::Method::POST, &format!("http://{ip}/settings"), Some(&pairs)).await
    }

    async fn get_status(&self, ip: Ipv4Addr) -> Result<Value, ClientError> {
        self.request(reqwest::Method::GET, &format!("http://{ip}/status"), None).await
    }

    async fn reboot(&self, ip: Ipv4Addr) -> Result<(), ClientError> {
        self.request(reqwest::Method::GET, &format!("http://{ip}/reboot"), None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_body_normalizes_to_empty_object() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

        let client = Gen1Client::new(DeviceAuth::default());
        let addr: std::net::SocketAddr = server.address().to_owned();
        let ip = match addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            _ => panic!("expected v4"),
        };
        let result = client.get_settings(ip).await.unwrap();
        assert_eq!(result, serde_json::json!({}));
    }

    #[tokio::test]
    async fn missing_credentials_on_401_returns_auth_required() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(
            ResponseTemplate::new(401)
            .insert_header("WWW-Authenticate", r#"Digest realm="shelly", nonce="n""#),
        )
        .mount(&server)
        .await;

        let client = Gen1Client::new(DeviceAuth::default());
        let addr: std::net::SocketAddr = server.address().to_owned();
        let ip = match addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            _ => panic!("expected v4"),
        };
        let err = client.get_settings(ip).await.unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired));
    }
}
