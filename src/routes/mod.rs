//! Page routing surface.
//!
//! The desktop tree is declared once as data; the mobile tree is derived from it with
//! the device rewrite rules. [`RouteTable::navigate`] combines the device switch and the
//! role guard into a single decision for a requested path.

pub mod api;

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::device::{is_mobile_path, to_mobile_path, DeviceProfile};
use crate::directory::Role;
use crate::security::access::{authorize_path, AccessDecision, LOGIN_PATH};
use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "roles", rename_all = "snake_case")]
pub enum RouteAccess {
    Public,
    /// Dispatches to the role home or the login page.
    Entry,
    Authenticated,
    Roles(Vec<Role>),
}

impl RouteAccess {
    fn required_roles(&self) -> &[Role] {
        match self {
            Self::Roles(roles) => roles,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRoute {
    pub pattern: String,
    pub page: &'static str,
    pub access: RouteAccess,
    pub mobile: bool,
}

impl PageRoute {
    pub fn new(pattern: &str, page: &'static str, access: RouteAccess) -> Self {
        Self {
            pattern: pattern.to_string(),
            page,
            access,
            mobile: false,
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.pattern.contains(':') || self.pattern.contains('*')
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.extract_params(path).is_some()
    }

    /// Named `:param` segments captured from `path`, or `None` on mismatch.
    pub fn extract_params(&self, path: &str) -> Option<HashMap<String, String>> {
        let pattern_parts: Vec<&str> = self.pattern.split('/').collect();
        let path_parts: Vec<&str> = path.split('/').collect();
        let mut params = HashMap::new();

        for (i, pattern_part) in pattern_parts.iter().enumerate() {
            if *pattern_part == "**" {
                return Some(params);
            }
            let path_part = path_parts.get(i)?;
            if let Some(name) = pattern_part.strip_prefix(':') {
                if path_part.is_empty() {
                    return None;
                }
                params.insert(name.to_string(), (*path_part).to_string());
            } else if *pattern_part != "*" && pattern_part != path_part {
                return None;
            }
        }

        (pattern_parts.len() == path_parts.len()).then_some(params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Navigation {
    Render {
        path: String,
        page: &'static str,
        params: HashMap<String, String>,
    },
    Redirect {
        to: String,
        replace: bool,
    },
    Pending,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<PageRoute>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(desktop_routes())
    }
}

impl RouteTable {
    /// Builds both trees from the desktop declarations.
    pub fn new(desktop: Vec<PageRoute>) -> Self {
        let mobile: Vec<PageRoute> = desktop
            .iter()
            .map(|route| PageRoute {
                pattern: to_mobile_path(&route.pattern),
                mobile: true,
                ..route.clone()
            })
            .collect();

        let mut routes = desktop;
        routes.extend(mobile);
        Self { routes }
    }

    pub fn routes(&self) -> &[PageRoute] {
        &self.routes
    }

    pub fn desktop(&self) -> impl Iterator<Item = &PageRoute> {
        self.routes.iter().filter(|r| !r.mobile)
    }

    pub fn mobile(&self) -> impl Iterator<Item = &PageRoute> {
        self.routes.iter().filter(|r| r.mobile)
    }

    /// Literal patterns win over parameterized ones, so `/tickets/new` is never an id.
    pub fn resolve(&self, path: &str) -> Option<(&PageRoute, HashMap<String, String>)> {
        let path = strip_query(path);
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        self.routes
            .iter()
            .filter(|r| !r.is_parameterized() && r.pattern == path)
            .map(|r| (r, HashMap::new()))
            .next()
            .or_else(|| {
                self.routes
                    .iter()
                    .filter(|r| r.is_parameterized())
                    .find_map(|r| r.extract_params(path).map(|p| (r, p)))
            })
    }

    pub fn navigate(&self, path: &str, session: &SessionState, device: DeviceProfile) -> Navigation {
        if let Some(to) = device.redirect_target(path) {
            debug!("Device redirect {path} -> {to}");
            return Navigation::Redirect { to, replace: true };
        }

        let Some((route, params)) = self.resolve(path) else {
            return Navigation::NotFound;
        };
        let identity = session.identity.as_ref();

        match route.access {
            RouteAccess::Public => Navigation::Render {
                path: path.to_string(),
                page: route.page,
                params,
            },
            RouteAccess::Entry => {
                if session.loading {
                    return Navigation::Pending;
                }
                let target = identity.map_or(LOGIN_PATH, |i| i.role.home_path());
                Navigation::Redirect {
                    to: localize(target, route.mobile),
                    replace: false,
                }
            }
            RouteAccess::Authenticated | RouteAccess::Roles(_) => {
                match authorize_path(path, identity, session.loading, route.access.required_roles()) {
                    AccessDecision::Pending => Navigation::Pending,
                    AccessDecision::Allow => Navigation::Render {
                        path: path.to_string(),
                        page: route.page,
                        params,
                    },
                    AccessDecision::DenyRedirect(redirect) => Navigation::Redirect {
                        to: localize(&redirect.location(), route.mobile),
                        replace: true,
                    },
                }
            }
        }
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

fn localize(path: &str, mobile: bool) -> String {
    if mobile && !is_mobile_path(path) {
        to_mobile_path(path)
    } else {
        path.to_string()
    }
}

pub fn desktop_routes() -> Vec<PageRoute> {
    use RouteAccess::{Authenticated, Entry, Public, Roles};

    vec![
        PageRoute::new("/", "index", Entry),
        PageRoute::new("/login", "login", Public),
        PageRoute::new("/register", "register", Public),
        PageRoute::new("/admin/register", "admin_register", Public),
        PageRoute::new("/landing", "landing", Public),
        PageRoute::new("/dashboard/admin", "admin_dashboard", Roles(vec![Role::Admin])),
        PageRoute::new("/dashboard/support", "support_dashboard", Roles(vec![Role::Support])),
        PageRoute::new("/dashboard/client", "client_dashboard", Roles(vec![Role::Client])),
        PageRoute::new("/users", "users", Roles(vec![Role::Admin])),
        PageRoute::new("/analytics", "analytics", Roles(vec![Role::Admin, Role::Support])),
        PageRoute::new("/tickets", "tickets", Authenticated),
        PageRoute::new("/tickets/new", "new_ticket", Authenticated),
        PageRoute::new("/tickets/:id", "ticket_detail", Authenticated),
        PageRoute::new("/notifications", "notifications", Authenticated),
        PageRoute::new("/profile", "profile", Authenticated),
        PageRoute::new("/settings", "settings", Authenticated),
        PageRoute::new("/knowledge", "knowledge", Authenticated),
    ]
}
