//! Shared fixtures for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use dashboard_session::{
    AccountStatus, AuthGrant, CredentialPair, Identity, MemoryCredentialStore, RecordingNotifier,
    RefreshGrant, Role, SessionConfig, SessionManager, SessionTransport, TransportError,
    TransportResult,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn identity(id: u64, role: Role) -> Identity {
    Identity {
        id,
        display_name: format!("User {}", id),
        email: format!("user{}@example.com", id),
        role,
        status: AccountStatus::Active,
        avatar_ref: None,
        two_factor_enabled: Some(false),
    }
}

pub fn admin() -> Identity {
    identity(1, Role::Administrator)
}

pub fn operator() -> Identity {
    identity(2, Role::StandardUser)
}

pub fn rejected(message: &str) -> TransportError {
    TransportError::Server {
        status: 401,
        message: Some(message.to_string()),
    }
}

/// Scripted transport: each operation pops its next queued result
#[derive(Default)]
pub struct FakeTransport {
    auth: Mutex<VecDeque<TransportResult<AuthGrant>>>,
    refresh: Mutex<VecDeque<TransportResult<RefreshGrant>>>,
    identity: Mutex<VecDeque<TransportResult<Identity>>>,
    identity_delay: Mutex<Option<Duration>>,
    refresh_delay: Mutex<Option<Duration>>,
    deauth_fails: Mutex<bool>,
    heartbeat_fails: Mutex<bool>,
    bearer: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_auth(&self, result: TransportResult<AuthGrant>) {
        self.auth.lock().push_back(result);
    }

    pub fn push_login(&self, access: &str, refresh: &str, identity: Identity) {
        self.push_auth(Ok(AuthGrant {
            credentials: CredentialPair::new(access, refresh),
            identity,
        }));
    }

    pub fn push_refresh(&self, result: TransportResult<RefreshGrant>) {
        self.refresh.lock().push_back(result);
    }

    pub fn push_refreshed(&self, access: &str, identity: Option<Identity>) {
        self.push_refresh(Ok(RefreshGrant {
            access_token: access.to_string(),
            identity,
        }));
    }

    pub fn push_identity(&self, result: TransportResult<Identity>) {
        self.identity.lock().push_back(result);
    }

    pub fn delay_identity(&self, delay: Duration) {
        *self.identity_delay.lock() = Some(delay);
    }

    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock() = Some(delay);
    }

    pub fn fail_deauth(&self) {
        *self.deauth_fails.lock() = true;
    }

    pub fn fail_heartbeat(&self) {
        *self.heartbeat_fails.lock() = true;
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == operation).count()
    }

    fn record(&self, operation: &str) {
        self.calls.lock().push(operation.to_string());
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn authenticate(&self, _email: &str, _secret: &str) -> TransportResult<AuthGrant> {
        self.record("authenticate");
        let next = self.auth.lock().pop_front();
        next.unwrap_or_else(|| Err(rejected("invalid credentials")))
    }

    async fn refresh(&self, _refresh_token: &str) -> TransportResult<RefreshGrant> {
        self.record("refresh");
        let delay = *self.refresh_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.refresh.lock().pop_front();
        next.unwrap_or_else(|| Err(rejected("invalid refresh token")))
    }

    async fn deauthenticate(&self, _refresh_token: &str) -> TransportResult<()> {
        self.record("deauthenticate");
        if *self.deauth_fails.lock() {
            return Err(TransportError::Network("connection reset".to_string()));
        }
        Ok(())
    }

    async fn fetch_identity(&self) -> TransportResult<Identity> {
        self.record("fetch_identity");
        let delay = *self.identity_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.identity.lock().pop_front();
        next.unwrap_or_else(|| Err(rejected("token expired")))
    }

    async fn heartbeat(&self) -> TransportResult<()> {
        self.record("heartbeat");
        if *self.heartbeat_fails.lock() {
            return Err(TransportError::Network("unreachable".to_string()));
        }
        Ok(())
    }

    fn attach(&self, access_token: &str) {
        *self.bearer.lock() = Some(access_token.to_string());
    }

    fn detach(&self) {
        *self.bearer.lock() = None;
    }
}

/// Session wired to fakes
pub struct Harness {
    pub session: Arc<SessionManager>,
    pub transport: Arc<FakeTransport>,
    pub store: Arc<MemoryCredentialStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(store: MemoryCredentialStore) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn empty() -> Self {
        Self::new(MemoryCredentialStore::new())
    }

    pub fn with_pair(access: &str, refresh: &str) -> Self {
        Self::new(MemoryCredentialStore::with_pair(&CredentialPair::new(access, refresh)))
    }

    pub fn with_config(store: MemoryCredentialStore, config: SessionConfig) -> Self {
        let transport = FakeTransport::new();
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::new());

        let session = SessionManager::new(
            transport.clone(),
            store.clone(),
            notifier.clone(),
            config,
        );

        Self {
            session,
            transport,
            store,
            notifier,
        }
    }
}
