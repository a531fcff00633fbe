//! Session Transport
//!
//! Request-issuing capability for the session core. Every call carries the
//! attached access token as a bearer credential. The transport never retries;
//! callers own retry policy.
//!
//! # Endpoints
//!
//! - `POST /api/auth/login` - Authenticate with email/password
//! - `POST /api/auth/refresh` - Mint a new access token
//! - `POST /api/auth/logout` - Revoke the refresh token
//! - `GET /api/auth/me` - Current identity
//! - `POST /api/status/heartbeat` - Liveness signal

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroize;

use crate::identity::{CredentialPair, Identity};

/// Deadline for the backend reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Tagged transport failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Backend unreachable (connect, DNS, TLS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Deadline elapsed before a response arrived
    #[error("Request timed out")]
    Timeout,

    /// Backend answered with a failure
    #[error("Server error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    /// Success response that could not be understood
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Authoritative rejection by the backend (as opposed to connectivity loss)
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Server { .. } | TransportError::Decode(_))
    }

    /// Server-provided message, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            TransportError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Successful authenticate payload
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub credentials: CredentialPair,
    pub identity: Identity,
}

/// Successful refresh payload
#[derive(Debug, Clone)]
pub struct RefreshGrant {
    pub access_token: String,
    pub identity: Option<Identity>,
}

/// Remote session operations consumed by the state machine
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn authenticate(&self, email: &str, secret: &str) -> TransportResult<AuthGrant>;

    async fn refresh(&self, refresh_token: &str) -> TransportResult<RefreshGrant>;

    /// Best-effort revocation of the refresh token
    async fn deauthenticate(&self, refresh_token: &str) -> TransportResult<()>;

    async fn fetch_identity(&self) -> TransportResult<Identity>;

    /// Advisory liveness signal
    async fn heartbeat(&self) -> TransportResult<()>;

    /// Attach the bearer credential sent with every subsequent call
    fn attach(&self, access_token: &str);

    /// Stop sending a bearer credential
    fn detach(&self);
}

/// Backend response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    sucesso: bool,
    dados: Option<T>,
    mensagem: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct LoginData {
    access_token: String,
    refresh_token: String,
    user: Identity,
}

#[derive(Deserialize)]
struct RefreshData {
    access_token: String,
    #[serde(default)]
    user: Option<Identity>,
}

/// reqwest-backed transport for the dashboard backend
pub struct HttpTransport {
    client: Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport whose requests are bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: RwLock::new(None),
        })
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> TransportResult<Self> {
        Self::new(&config.api_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a bearer credential is currently attached
    pub fn is_attached(&self) -> bool {
        self.bearer.read().is_some()
    }

    /// Check whether the backend answers at all
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Backend probe failed: {}", e);
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_bearer(&self, request: RequestBuilder) -> RequestBuilder {
        match self.bearer.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and unwrap the envelope payload
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<Option<T>> {
        let response = self.with_bearer(request).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(server_error(status, &body));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        if !envelope.sucesso {
            return Err(TransportError::Server {
                status: status.as_u16(),
                message: envelope.mensagem,
            });
        }

        Ok(envelope.dados)
    }

    /// Send a request whose payload is irrelevant
    async fn send_unit(&self, request: RequestBuilder) -> TransportResult<()> {
        let response = self.with_bearer(request).send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Err(server_error(status, &body))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

fn server_error(status: StatusCode, body: &[u8]) -> TransportError {
    let message = serde_json::from_slice::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.mensagem);

    TransportError::Server {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn authenticate(&self, email: &str, secret: &str) -> TransportResult<AuthGrant> {
        debug!(email, "POST /api/auth/login");
        let request = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest { email, password: secret });

        let data: LoginData = self
            .send(request)
            .await?
            .ok_or_else(|| TransportError::Decode("login response without payload".into()))?;

        Ok(AuthGrant {
            credentials: CredentialPair::new(data.access_token, data.refresh_token),
            identity: data.user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> TransportResult<RefreshGrant> {
        debug!("POST /api/auth/refresh");
        let request = self
            .client
            .post(self.url("/api/auth/refresh"))
            .json(&RefreshRequest { refresh_token });

        let data: RefreshData = self
            .send(request)
            .await?
            .ok_or_else(|| TransportError::Decode("refresh response without payload".into()))?;

        Ok(RefreshGrant {
            access_token: data.access_token,
            identity: data.user,
        })
    }

    async fn deauthenticate(&self, refresh_token: &str) -> TransportResult<()> {
        debug!("POST /api/auth/logout");
        let request = self
            .client
            .post(self.url("/api/auth/logout"))
            .json(&RefreshRequest { refresh_token });

        self.send_unit(request).await
    }

    async fn fetch_identity(&self) -> TransportResult<Identity> {
        debug!("GET /api/auth/me");
        let request = self.client.get(self.url("/api/auth/me"));

        self.send(request)
            .await?
            .ok_or_else(|| TransportError::Decode("identity response without payload".into()))
    }

    async fn heartbeat(&self) -> TransportResult<()> {
        let request = self.client.post(self.url("/api/status/heartbeat"));
        self.send_unit(request).await
    }

    fn attach(&self, access_token: &str) {
        if let Some(mut old) = self.bearer.write().replace(access_token.to_string()) {
            old.zeroize();
        }
    }

    fn detach(&self) {
        if let Some(mut old) = self.bearer.write().take() {
            old.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_extracts_message() {
        let body = r#"{"sucesso": false, "mensagem": "Credenciais inválidas"}"#;
        let err = server_error(StatusCode::UNAUTHORIZED, body.as_bytes());

        assert_eq!(
            err,
            TransportError::Server {
                status: 401,
                message: Some("Credenciais inválidas".to_string()),
            }
        );
        assert_eq!(err.server_message(), Some("Credenciais inválidas"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_server_error_with_unparseable_body() {
        let err = server_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(err, TransportError::Server { status: 502, message: None });
    }

    #[test]
    fn test_network_errors_are_not_rejections() {
        assert!(!TransportError::Network("connection refused".into()).is_rejection());
        assert!(!TransportError::Timeout.is_rejection());
    }

    #[test]
    fn test_attach_and_detach() {
        let transport = HttpTransport::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
        assert!(!transport.is_attached());

        transport.attach("token");
        assert!(transport.is_attached());

        transport.detach();
        assert!(!transport.is_attached());
    }
}
