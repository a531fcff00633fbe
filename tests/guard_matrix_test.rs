//! Access Guard Decision Matrix
//!
//! Every session status against every access requirement, plus resolution
//! through the dashboard route table.

mod common;

use common::{admin, operator};
use dashboard_session::{
    decide, evaluate_path, AccessDecision, Redirect, Role, RouteAccess, RouteTable,
    SessionSnapshot, SessionStatus,
};

const ADMIN_ONLY: RouteAccess = RouteAccess::Role(Role::Administrator);

fn login_from(location: &str) -> AccessDecision {
    AccessDecision::RedirectTo(Redirect::Login {
        from: location.to_string(),
    })
}

fn home() -> AccessDecision {
    AccessDecision::RedirectTo(Redirect::Home)
}

fn settled(status: SessionStatus) -> SessionSnapshot {
    SessionSnapshot {
        status,
        loading: false,
    }
}

#[test]
fn test_decision_matrix() {
    let admin = SessionStatus::Authenticated(admin());
    let user = SessionStatus::Authenticated(operator());
    let loc = "/somewhere";

    let cases = [
        // Booting
        (SessionStatus::Booting, RouteAccess::Public, AccessDecision::ShowPending),
        (SessionStatus::Booting, RouteAccess::Authenticated, AccessDecision::ShowPending),
        (SessionStatus::Booting, ADMIN_ONLY, AccessDecision::ShowPending),
        (SessionStatus::Booting, RouteAccess::AnonymousOnly, AccessDecision::ShowPending),
        // Anonymous
        (SessionStatus::Anonymous, RouteAccess::Public, AccessDecision::Render),
        (SessionStatus::Anonymous, RouteAccess::Authenticated, login_from(loc)),
        (SessionStatus::Anonymous, ADMIN_ONLY, login_from(loc)),
        (SessionStatus::Anonymous, RouteAccess::AnonymousOnly, AccessDecision::Render),
        // Administrator
        (admin.clone(), RouteAccess::Public, AccessDecision::Render),
        (admin.clone(), RouteAccess::Authenticated, AccessDecision::Render),
        (admin.clone(), ADMIN_ONLY, AccessDecision::Render),
        (admin.clone(), RouteAccess::AnonymousOnly, home()),
        // Standard user
        (user.clone(), RouteAccess::Public, AccessDecision::Render),
        (user.clone(), RouteAccess::Authenticated, AccessDecision::Render),
        (user.clone(), ADMIN_ONLY, home()),
        (user.clone(), RouteAccess::AnonymousOnly, home()),
    ];

    for (status, access, expected) in cases {
        let decision = decide(&status, false, access, loc);
        assert_eq!(
            decision, expected,
            "status={} access={:?}",
            status.as_str(),
            access
        );
    }
}

#[test]
fn test_loading_is_pending_for_every_cell() {
    let statuses = [
        SessionStatus::Booting,
        SessionStatus::Anonymous,
        SessionStatus::Authenticated(admin()),
        SessionStatus::Authenticated(operator()),
    ];
    let accesses = [
        RouteAccess::Public,
        RouteAccess::Authenticated,
        ADMIN_ONLY,
        RouteAccess::AnonymousOnly,
    ];

    for status in &statuses {
        for access in accesses {
            assert_eq!(decide(status, true, access, "/x"), AccessDecision::ShowPending);
        }
    }
}

#[test]
fn test_decisions_are_stateless() {
    let status = SessionStatus::Anonymous;
    let first = decide(&status, false, RouteAccess::Authenticated, "/plcs");
    let second = decide(&status, false, RouteAccess::Authenticated, "/plcs");
    assert_eq!(first, second);
}

#[test]
fn test_evaluate_dashboard_paths() {
    let table = RouteTable::dashboard();
    let anonymous = settled(SessionStatus::Anonymous);
    let user = settled(SessionStatus::Authenticated(operator()));
    let admin = settled(SessionStatus::Authenticated(admin()));

    assert_eq!(
        evaluate_path(&table, &anonymous, "/plcs/7/edit?tab=tags"),
        login_from("/plcs/7/edit?tab=tags")
    );
    assert_eq!(evaluate_path(&table, &anonymous, "/login"), AccessDecision::Render);
    assert_eq!(evaluate_path(&table, &anonymous, "/reset-password?token=abc"), AccessDecision::Render);
    assert_eq!(evaluate_path(&table, &anonymous, "/"), login_from("/"));

    assert_eq!(evaluate_path(&table, &user, "/login"), home());
    assert_eq!(evaluate_path(&table, &user, "/forgot-password"), home());
    assert_eq!(evaluate_path(&table, &user, "/users"), home());
    assert_eq!(evaluate_path(&table, &user, "/faults/definitions/3/edit"), AccessDecision::Render);
    assert_eq!(evaluate_path(&table, &user, "/reset-password"), AccessDecision::Render);

    for path in ["/users", "/audit", "/permissions", "/settings"] {
        assert_eq!(evaluate_path(&table, &admin, path), AccessDecision::Render);
    }
}

#[test]
fn test_unknown_path_renders_not_found() {
    let table = RouteTable::dashboard();
    let anonymous = settled(SessionStatus::Anonymous);

    assert_eq!(evaluate_path(&table, &anonymous, "/no/such/view"), AccessDecision::Render);
}

#[test]
fn test_redirect_paths() {
    let redirect = Redirect::Login {
        from: "/users".to_string(),
    };
    assert_eq!(redirect.path(), "/login");
    assert_eq!(Redirect::Home.path(), "/dashboard");
}
