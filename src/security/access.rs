use serde::Serialize;

use crate::directory::{Identity, Role};

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Originally requested path, carried on login redirects only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            to: path.into(),
            from: None,
        }
    }

    pub fn login(from: Option<&str>) -> Self {
        Self {
            to: LOGIN_PATH.to_string(),
            from: from.map(str::to_string),
        }
    }

    pub fn is_login(&self) -> bool {
        self.to == LOGIN_PATH || self.to.ends_with(LOGIN_PATH)
    }

    /// Target with the `from` query attached.
    pub fn location(&self) -> String {
        match self.from {
            Some(ref from) => format!("{}?from={}", self.to, urlencoding::encode(from)),
            None => self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Pending,
    DenyRedirect(Redirect),
    Allow,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Gate for a protected route. An empty `required_roles` admits any signed-in identity.
pub fn authorize(
    identity: Option<&Identity>,
    loading: bool,
    required_roles: &[Role],
) -> AccessDecision {
    if loading {
        return AccessDecision::Pending;
    }

    let Some(identity) = identity else {
        return AccessDecision::DenyRedirect(Redirect::login(None));
    };

    if !required_roles.is_empty() && !required_roles.contains(&identity.role) {
        return AccessDecision::DenyRedirect(Redirect::to(identity.role.home_path()));
    }

    AccessDecision::Allow
}

/// Same as [`authorize`], remembering `requested_path` on a login redirect.
pub fn authorize_path(
    requested_path: &str,
    identity: Option<&Identity>,
    loading: bool,
    required_roles: &[Role],
) -> AccessDecision {
    match authorize(identity, loading, required_roles) {
        AccessDecision::DenyRedirect(redirect) if redirect.is_login() => {
            AccessDecision::DenyRedirect(Redirect::login(Some(requested_path)))
        }
        other => other,
    }
}
