//! Dashboard Session Core
//!
//! Client-side session and access control for the PLC monitoring dashboard.
//!
//! # Features
//!
//! - **Session State Machine**: `Booting` → `Anonymous` / `Authenticated`, driven by
//!   bootstrap, login, refresh and logout
//! - **Credential Store**: durable access/refresh token persistence
//! - **Session Transport**: bearer-authenticated calls to the dashboard backend
//! - **Background Scheduler**: proactive token refresh and liveness heartbeat while signed in
//! - **Access Guard**: pure render / pending / redirect decisions per route
//!
//! # Architecture
//!
//! ```text
//! Views ──► Access Guard ──► SessionSnapshot (watch)
//!                                  ▲
//!                           SessionManager ──► SessionTransport ──► Backend
//!                              │      │
//!                              │      └── BackgroundScheduler (refresh, heartbeat)
//!                              └── CredentialStore (session.json)
//! ```

pub mod config;
pub mod guard;
pub mod identity;
pub mod notify;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;

pub use config::Config;
pub use guard::{decide, decide_for, evaluate_path, AccessDecision, Redirect, RouteAccess};
pub use identity::{AccountStatus, CredentialPair, Identity, Role, SessionStatus};
pub use notify::{LogNotifier, Notice, NoticeLevel, Notifier, RecordingNotifier};
pub use routes::{Route, RouteMatch, RouteTable};
pub use scheduler::{BackgroundScheduler, ScheduledTask, SchedulerConfig, SessionTasks};
pub use session::{SessionConfig, SessionError, SessionManager, SessionSnapshot};
pub use store::{CredentialKey, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
pub use transport::{
    AuthGrant, HttpTransport, RefreshGrant, SessionTransport, TransportError, TransportResult,
};
