//! Dashboard route table
//!
//! Navigable views of the dashboard and the access requirement of each.
//! Patterns use `:name` segments for parameters.

use std::collections::HashMap;

use crate::guard::{RouteAccess, HOME_PATH, LOGIN_PATH};
use crate::identity::Role;

/// A navigable view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub pattern: &'static str,
    pub access: RouteAccess,
}

impl Route {
    pub const fn new(name: &'static str, pattern: &'static str, access: RouteAccess) -> Self {
        Self { name, pattern, access }
    }
}

/// Result of resolving a location
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

impl RouteMatch<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

const ADMIN: RouteAccess = RouteAccess::Role(Role::Administrator);

/// Fallback for unknown locations
static NOT_FOUND: Route = Route::new("not_found", "*", RouteAccess::Public);

static DASHBOARD_ROUTES: &[Route] = &[
    Route::new("login", LOGIN_PATH, RouteAccess::AnonymousOnly),
    Route::new("forgot_password", "/forgot-password", RouteAccess::AnonymousOnly),
    Route::new("reset_password", "/reset-password", RouteAccess::Public),
    Route::new("dashboard", HOME_PATH, RouteAccess::Authenticated),
    Route::new("profile", "/profile", RouteAccess::Authenticated),
    Route::new("plc_list", "/plcs", RouteAccess::Authenticated),
    Route::new("plc_create", "/plcs/new", RouteAccess::Authenticated),
    Route::new("plc_details", "/plcs/:id", RouteAccess::Authenticated),
    Route::new("plc_edit", "/plcs/:id/edit", RouteAccess::Authenticated),
    Route::new("tag_create", "/plcs/:plcId/tags/new", RouteAccess::Authenticated),
    Route::new("tag_edit", "/plcs/:plcId/tags/:id/edit", RouteAccess::Authenticated),
    Route::new("faults_active", "/faults", RouteAccess::Authenticated),
    Route::new("fault_definitions", "/faults/definitions", RouteAccess::Authenticated),
    Route::new("fault_definition_create", "/faults/definitions/new", RouteAccess::Authenticated),
    Route::new("fault_definition_edit", "/faults/definitions/:id/edit", RouteAccess::Authenticated),
    Route::new("users", "/users", ADMIN),
    Route::new("audit", "/audit", ADMIN),
    Route::new("permissions", "/permissions", ADMIN),
    Route::new("settings", "/settings", ADMIN),
];

/// Ordered route table; static segments win over parameters
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    aliases: HashMap<&'static str, &'static str>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes,
            aliases: HashMap::new(),
        }
    }

    /// The dashboard's routes, with `/` aliased to the home view
    pub fn dashboard() -> Self {
        let mut table = Self::new(DASHBOARD_ROUTES.to_vec());
        table.alias("/", HOME_PATH);
        table
    }

    /// Treat `from` as `to` when resolving
    pub fn alias(&mut self, from: &'static str, to: &'static str) {
        self.aliases.insert(from, to);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn by_name(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// Resolve a location (path plus optional query/fragment)
    pub fn resolve(&self, location: &str) -> RouteMatch<'_> {
        let path = normalize(location);
        let path = self.aliases.get(path.as_str()).copied().unwrap_or(path.as_str());
        let segments: Vec<&str> = split(path);

        let mut best: Option<(usize, RouteMatch<'_>)> = None;

        for route in &self.routes {
            let Some(params) = match_pattern(route.pattern, &segments) else {
                continue;
            };
            // Prefer the route with the fewest parameters
            let score = params.len();
            if best.as_ref().map_or(true, |(s, _)| score < *s) {
                best = Some((score, RouteMatch { route, params }));
            }
        }

        best.map(|(_, m)| m).unwrap_or_else(|| RouteMatch {
            route: &NOT_FOUND,
            params: HashMap::new(),
        })
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::dashboard()
    }
}

/// Strip query, fragment and trailing slash
fn normalize(location: &str) -> String {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_pattern(pattern: &str, segments: &[&str]) -> Option<HashMap<String, String>> {
    let parts = split(pattern);
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (part, segment) in parts.iter().zip(segments) {
        if let Some(name) = part.strip_prefix(':') {
            params.insert(name.to_string(), (*segment).to_string());
        } else if part != segment {
            return None;
        }
    }
    Some(params)
}
