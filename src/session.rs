//! Session State Machine
//!
//! Owns the in-memory session status and the only four operations allowed to
//! change it: `bootstrap`, `login`, `refresh` and `logout` (plus `revalidate`,
//! which re-runs the bootstrap check for an already settled session).
//!
//! ```text
//! Booting ──bootstrap──► Authenticated ◄──refresh──┐
//!    │                      │   ▲                  │
//!    │                      │   └──────────────────┘
//!    └──bootstrap──► Anonymous ◄──logout / failed recovery
//!                      │
//!                      └──login──► Authenticated
//! ```
//!
//! Every commit that establishes or ends a session bumps a generation
//! counter. Work that started under an older generation drops its result.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::identity::{Identity, SessionStatus};
use crate::notify::Notifier;
use crate::scheduler::{BackgroundScheduler, SchedulerConfig, SessionTasks};
use crate::store::{CredentialKey, CredentialStore, StoreError};
use crate::transport::{SessionTransport, TransportError, TransportResult};

/// Notification shown after a successful login
pub const LOGIN_SUCCESS_MESSAGE: &str = "Signed in successfully";

/// Fallback when the backend gives no reason for a failed login
pub const LOGIN_FAILURE_MESSAGE: &str = "Sign-in failed. Check your credentials.";

/// Notification shown after a user-initiated logout
pub const LOGOUT_MESSAGE: &str = "Session ended";

/// Errors surfaced to callers of `login`
#[derive(Debug, Error)]
pub enum SessionError {
    /// Backend refused the credentials
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Backend could not be reached
    #[error("{message}")]
    Unreachable {
        message: String,
        #[source]
        source: TransportError,
    },

    /// Credentials accepted but could not be persisted
    #[error("Failed to persist credentials: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    fn from_transport(err: TransportError) -> Self {
        let message = err
            .server_message()
            .unwrap_or(LOGIN_FAILURE_MESSAGE)
            .to_string();

        match err {
            TransportError::Server { status, .. } => SessionError::Rejected { status, message },
            TransportError::Decode(_) => SessionError::Rejected { status: 200, message },
            other => SessionError::Unreachable { message, source: other },
        }
    }

    /// Message suitable for display next to the login form
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Rejected { message, .. } | SessionError::Unreachable { message, .. } => {
                message.clone()
            }
            SessionError::Store(_) => LOGIN_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// State machine configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for every remote call
    pub request_timeout: Duration,
    /// Keep stored credentials when recovery fails only because the backend is unreachable
    pub keep_credentials_offline: bool,
    /// Periodic task intervals
    pub scheduler: SchedulerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            keep_credentials_offline: false,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            keep_credentials_offline: config.keep_credentials_offline,
            scheduler: SchedulerConfig {
                refresh_interval: config.refresh_interval,
                heartbeat_interval: config.heartbeat_interval,
            },
        }
    }
}

/// What views observe: status plus the transitional loading flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.status.is_authenticated()
    }
}

/// Why a refresh attempt did not produce a new access token
#[derive(Debug)]
enum RefreshFailure {
    NoRefreshToken,
    Transport(TransportError),
    Store(StoreError),
    Superseded,
}

impl RefreshFailure {
    fn transport_error(&self) -> Option<&TransportError> {
        match self {
            RefreshFailure::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Marks a refresh as in flight for its lifetime
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Authenticated-session state machine
pub struct SessionManager {
    me: Weak<SessionManager>,
    transport: Arc<dyn SessionTransport>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    scheduler: BackgroundScheduler,
    config: SessionConfig,
    state: watch::Sender<SessionSnapshot>,
    generation: AtomicU64,
    refreshes_in_flight: AtomicUsize,
    bootstrapped: AtomicBool,
}

impl SessionManager {
    /// Create a manager in `Booting`; call [`SessionManager::bootstrap`] next
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot {
            status: SessionStatus::Booting,
            loading: true,
        });

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            store,
            notifier,
            scheduler: BackgroundScheduler::new(config.scheduler.clone()),
            config,
            state,
            generation: AtomicU64::new(0),
            refreshes_in_flight: AtomicUsize::new(0),
            bootstrapped: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().status.identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().status.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Receiver notified on every status or loading change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.scheduler
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Reconstruct the session from persisted credentials.
    ///
    /// Never surfaces an error: an expired session on load ends in a silent
    /// logout. Runs once; later calls return the current status.
    pub async fn bootstrap(&self) -> SessionStatus {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            debug!("Bootstrap already ran");
            return self.status();
        }

        let generation = self.generation();
        let access = self.stored(CredentialKey::Access);
        let refresh = self.stored(CredentialKey::Refresh);

        match (access, refresh) {
            (None, None) => {
                debug!("No stored credentials, session is anonymous");
                self.settle_anonymous();
            }
            (Some(access), _) => {
                self.transport.attach(&access);
                self.verify(generation).await;
            }
            (None, Some(_)) => {
                debug!("Refresh credential without access credential, attempting refresh");
                self.recover(generation, None).await;
            }
        }

        self.status()
    }

    /// Re-check an already settled session, e.g. after connectivity returns
    pub async fn revalidate(&self) -> SessionStatus {
        if self.status() == SessionStatus::Booting {
            debug!("Revalidate skipped, bootstrap pending");
            return self.status();
        }

        let Some(access) = self.stored(CredentialKey::Access) else {
            return self.status();
        };

        let generation = self.generation();
        self.transport.attach(&access);
        self.verify(generation).await;
        self.status()
    }

    /// Authenticate with email and secret.
    ///
    /// On failure the error is notified and returned so the caller can keep
    /// its form in an error state. Stored credentials are left untouched.
    pub async fn login(&self, email: &str, secret: &str) -> Result<Identity, SessionError> {
        self.set_loading(true);

        let grant = match self.timed(self.transport.authenticate(email, secret)).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(email, error = %e, "Login failed");
                let err = SessionError::from_transport(e);
                self.notifier.error(&err.user_message());
                self.fail_login();
                return Err(err);
            }
        };

        if let Err(e) = self.store.save(&grant.credentials) {
            warn!(error = %e, "Failed to persist credentials after login");
            self.notifier.error(LOGIN_FAILURE_MESSAGE);
            self.fail_login();
            return Err(SessionError::Store(e));
        }

        self.transport.attach(&grant.credentials.access_token);
        self.bump_generation();
        self.settle_authenticated(grant.identity.clone());

        info!(user_id = grant.identity.id, role = %grant.identity.role, "Logged in");
        self.notifier.success(LOGIN_SUCCESS_MESSAGE);
        Ok(grant.identity)
    }

    /// Mint a new access token from the stored refresh credential.
    ///
    /// Returns `false` without changing status when no refresh credential is
    /// stored or the transport fails; callers decide whether that means logout.
    pub async fn refresh(&self) -> bool {
        let generation = self.generation();
        match self.refresh_access(generation).await {
            Ok(_) => true,
            Err(RefreshFailure::Store(e)) => {
                warn!(error = %e, "Refreshed access credential could not be stored");
                false
            }
            Err(failure) => {
                debug!(?failure, "Refresh did not succeed");
                false
            }
        }
    }

    /// End the session locally; remote revocation is best-effort.
    ///
    /// Never fails. `notify` is false for logouts the user did not ask for.
    pub async fn logout(&self, notify: bool) {
        self.set_loading(true);

        // Cancel timers first so a late refresh cannot re-persist a token
        self.scheduler.stop();
        let generation = self.bump_generation();

        if let Some(mut refresh_token) = self.stored(CredentialKey::Refresh) {
            if let Err(e) = self.timed(self.transport.deauthenticate(&refresh_token)).await {
                warn!(error = %e, "Remote logout failed, continuing with local logout");
            }
            refresh_token.zeroize();
        }

        if self.generation() != generation {
            // A newer session was established while revoking
            debug!("Logout superseded by a newer session");
            return;
        }

        self.teardown();

        if notify {
            self.notifier.success(LOGOUT_MESSAGE);
        }
        info!("Logged out");
    }

    /// Stop background work; the session itself is kept
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Check the attached access token, falling back to refresh
    async fn verify(&self, generation: u64) {
        match self.timed(self.transport.fetch_identity()).await {
            Ok(identity) => {
                if self.generation() != generation {
                    debug!("Identity check superseded");
                    return;
                }
                debug!(user_id = identity.id, "Stored access credential accepted");
                self.settle_authenticated(identity);
            }
            Err(e) => {
                if self.generation() != generation {
                    debug!("Identity check superseded");
                    return;
                }
                debug!(error = %e, "Stored access credential rejected");
                self.recover(generation, Some(e)).await;
            }
        }
    }

    /// One refresh attempt; anything short of success ends the session silently
    async fn recover(&self, generation: u64, cause: Option<TransportError>) {
        let failure = match self.refresh_access(generation).await {
            Ok(Some(identity)) => {
                self.settle_authenticated(identity);
                return;
            }
            Ok(None) => match self.timed(self.transport.fetch_identity()).await {
                Ok(identity) if self.generation() == generation => {
                    self.settle_authenticated(identity);
                    return;
                }
                Ok(_) => RefreshFailure::Superseded,
                Err(e) => RefreshFailure::Transport(e),
            },
            Err(failure) => failure,
        };

        if matches!(failure, RefreshFailure::Superseded) || self.generation() != generation {
            debug!("Recovery superseded by a newer session");
            return;
        }

        let last_error = failure.transport_error().or(cause.as_ref());
        let offline = matches!(last_error, Some(TransportError::Network(_)));

        if offline && self.config.keep_credentials_offline {
            info!("Backend unreachable, keeping stored credentials");
            self.scheduler.stop();
            self.transport.detach();
            self.publish(SessionStatus::Anonymous, false);
            return;
        }

        debug!(?failure, "Session could not be recovered, logging out");
        self.logout(false).await;
    }

    /// Exchange the stored refresh credential for a new access credential
    async fn refresh_access(&self, generation: u64) -> Result<Option<Identity>, RefreshFailure> {
        let _in_flight = InFlightGuard::new(&self.refreshes_in_flight);

        let Some(refresh_token) = self.stored(CredentialKey::Refresh) else {
            return Err(RefreshFailure::NoRefreshToken);
        };

        let grant = self
            .timed(self.transport.refresh(&refresh_token))
            .await
            .map_err(RefreshFailure::Transport)?;

        if self.generation() != generation {
            return Err(RefreshFailure::Superseded);
        }

        self.store
            .set(CredentialKey::Access, &grant.access_token)
            .map_err(RefreshFailure::Store)?;
        self.transport.attach(&grant.access_token);

        if let Some(identity) = &grant.identity {
            self.state.send_if_modified(|snapshot| match &snapshot.status {
                SessionStatus::Authenticated(current) if current != identity => {
                    snapshot.status = SessionStatus::Authenticated(identity.clone());
                    true
                }
                _ => false,
            });
        }

        debug!("Access credential refreshed");
        Ok(grant.identity)
    }

    fn settle_authenticated(&self, identity: Identity) {
        self.publish(SessionStatus::Authenticated(identity), false);
        self.scheduler.start(self.me.clone());
    }

    fn settle_anonymous(&self) {
        self.scheduler.stop();
        self.publish(SessionStatus::Anonymous, false);
    }

    fn teardown(&self) {
        self.scheduler.stop();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        self.transport.detach();
        self.publish(SessionStatus::Anonymous, false);
    }

    /// Settle after a failed login
    fn fail_login(&self) {
        let bootstrap_started = self.bootstrapped.load(Ordering::SeqCst);
        self.state.send_modify(|snapshot| match snapshot.status {
            // The running bootstrap settles the status
            SessionStatus::Booting if bootstrap_started => {}
            SessionStatus::Authenticated(_) => snapshot.loading = false,
            _ => {
                snapshot.status = SessionStatus::Anonymous;
                snapshot.loading = false;
            }
        });
    }

    fn publish(&self, status: SessionStatus, loading: bool) {
        self.state.send_if_modified(|snapshot| {
            let changed = snapshot.status != status || snapshot.loading != loading;
            if changed {
                debug!(from = snapshot.status.as_str(), to = status.as_str(), "Session transition");
                snapshot.status = status;
                snapshot.loading = loading;
            }
            changed
        });
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|snapshot| {
            let changed = snapshot.loading != loading;
            snapshot.loading = loading;
            changed
        });
    }

    fn stored(&self, key: CredentialKey) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Failed to read stored credential");
                None
            }
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Bound a remote call by the configured request timeout
    async fn timed<T>(&self, call: impl Future<Output = TransportResult<T>>) -> TransportResult<T> {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait]
impl SessionTasks for SessionManager {
    async fn proactive_refresh(&self) {
        if self.stored(CredentialKey::Access).is_none() {
            return;
        }
        if self.refreshes_in_flight.load(Ordering::SeqCst) > 0 {
            debug!("Refresh already in flight, skipping proactive refresh");
            return;
        }

        // A single miss is not a logout; real expiry surfaces on the next request
        if !self.refresh().await {
            warn!("Proactive refresh failed, keeping session");
        }
    }

    async fn heartbeat(&self) {
        if self.stored(CredentialKey::Access).is_none() {
            return;
        }
        if let Err(e) = self.timed(self.transport.heartbeat()).await {
            debug!(error = %e, "Heartbeat failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_error_uses_server_message() {
        let err = SessionError::from_transport(TransportError::Server {
            status: 401,
            message: Some("invalid credentials".to_string()),
        });

        assert!(matches!(err, SessionError::Rejected { status: 401, .. }));
        assert_eq!(err.user_message(), "invalid credentials");
        assert_eq!(err.to_string(), "invalid credentials");
    }

    #[test]
    fn test_rejected_error_falls_back_to_generic_message() {
        let err = SessionError::from_transport(TransportError::Server {
            status: 500,
            message: None,
        });
        assert_eq!(err.user_message(), LOGIN_FAILURE_MESSAGE);
    }

    #[test]
    fn test_network_error_is_unreachable() {
        let err = SessionError::from_transport(TransportError::Timeout);
        assert!(matches!(err, SessionError::Unreachable { .. }));
        assert_eq!(err.user_message(), LOGIN_FAILURE_MESSAGE);
    }

    #[test]
    fn test_in_flight_guard() {
        let counter = AtomicUsize::new(0);
        {
            let _a = InFlightGuard::new(&counter);
            let _b = InFlightGuard::new(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.keep_credentials_offline);
    }
}
