//! Access Guard
//!
//! Pure decision function gating navigation on session status and role.
//! No side effects and no memory of earlier decisions; re-evaluate on every
//! navigation and every status/loading change.

use serde::Serialize;

use crate::identity::{Role, SessionStatus};
use crate::routes::RouteTable;
use crate::session::SessionSnapshot;

/// Login view path
pub const LOGIN_PATH: &str = "/login";

/// Safe default for authenticated users
pub const HOME_PATH: &str = "/dashboard";

/// Access requirement of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAccess {
    /// Anyone, any status
    Public,
    /// Signed-in users only
    Authenticated,
    /// Signed-in users holding this role
    Role(Role),
    /// Signed-out users only (login, password recovery)
    AnonymousOnly,
}

/// Redirect target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Redirect {
    /// Login view, remembering where the user wanted to go
    Login { from: String },
    /// Home view
    Home,
}

impl Redirect {
    pub fn path(&self) -> &'static str {
        match self {
            Redirect::Login { .. } => LOGIN_PATH,
            Redirect::Home => HOME_PATH,
        }
    }
}

/// What the routing layer should do with a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Neutral waiting indication, never a redirect
    ShowPending,
    RedirectTo(Redirect),
    Render,
}

/// Decide how a view with requirement `access` is handled.
///
/// `location` is the originally requested location, carried on login
/// redirects for post-login return.
pub fn decide(
    status: &SessionStatus,
    loading: bool,
    access: RouteAccess,
    location: &str,
) -> AccessDecision {
    if loading {
        return AccessDecision::ShowPending;
    }

    match (status, access) {
        // Credentials not evaluated yet
        (SessionStatus::Booting, _) => AccessDecision::ShowPending,

        (_, RouteAccess::Public) => AccessDecision::Render,

        (SessionStatus::Anonymous, RouteAccess::Authenticated | RouteAccess::Role(_)) => {
            AccessDecision::RedirectTo(Redirect::Login {
                from: location.to_string(),
            })
        }
        (SessionStatus::Anonymous, RouteAccess::AnonymousOnly) => AccessDecision::Render,

        (SessionStatus::Authenticated(_), RouteAccess::AnonymousOnly) => {
            AccessDecision::RedirectTo(Redirect::Home)
        }
        (SessionStatus::Authenticated(identity), RouteAccess::Role(required))
            if identity.role != required =>
        {
            AccessDecision::RedirectTo(Redirect::Home)
        }
        (SessionStatus::Authenticated(_), _) => AccessDecision::Render,
    }
}

/// Decide for a snapshot
pub fn decide_for(snapshot: &SessionSnapshot, access: RouteAccess, location: &str) -> AccessDecision {
    decide(&snapshot.status, snapshot.loading, access, location)
}

/// Resolve `location` in `table` and decide for it
pub fn evaluate_path(table: &RouteTable, snapshot: &SessionSnapshot, location: &str) -> AccessDecision {
    let route = table.resolve(location).route;
    decide_for(snapshot, route.access, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AccountStatus, Identity};

    fn authenticated(role: Role) -> SessionStatus {
        SessionStatus::Authenticated(Identity {
            id: 1,
            display_name: "Test".to_string(),
            email: "test@example.com".to_string(),
            role,
            status: AccountStatus::Active,
            avatar_ref: None,
            two_factor_enabled: None,
        })
    }

    #[test]
    fn test_loading_never_redirects() {
        for status in [SessionStatus::Anonymous, authenticated(Role::StandardUser)] {
            let decision = decide(&status, true, RouteAccess::AnonymousOnly, "/login");
            assert_eq!(decision, AccessDecision::ShowPending);
        }
    }

    #[test]
    fn test_login_redirect_keeps_location() {
        let decision = decide(&SessionStatus::Anonymous, false, RouteAccess::Authenticated, "/plcs/4?tab=tags");
        assert_eq!(
            decision,
            AccessDecision::RedirectTo(Redirect::Login {
                from: "/plcs/4?tab=tags".to_string()
            })
        );
    }

    #[test]
    fn test_role_mismatch_goes_home() {
        let decision = decide(
            &authenticated(Role::StandardUser),
            false,
            RouteAccess::Role(Role::Administrator),
            "/users",
        );
        assert_eq!(decision, AccessDecision::RedirectTo(Redirect::Home));
        assert_eq!(Redirect::Home.path(), HOME_PATH);
    }

    #[test]
    fn test_decision_serializes_tagged() {
        let json = serde_json::to_value(AccessDecision::RedirectTo(Redirect::Home)).unwrap();
        assert_eq!(json["decision"], "redirect_to");
        assert_eq!(json["to"], "home");
    }
}
