use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, header::COOKIE, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::access::{authorize, AccessDecision};
use super::session::extract_token_from_cookie;
use crate::core::error::PortalError;
use crate::core::shared::state::AppState;
use crate::directory::{Identity, Role};

/// Token the current request authenticated with.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookies| extract_token_from_cookie(cookies, cookie_name))
    })
}

/// Resolves the session token to an [`Identity`] request extension. Never rejects;
/// gating is left to [`require_roles`].
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = &state.sessions.config().cookie_name;
    if let Some(token) = extract_token(request.headers(), cookie_name) {
        match state.sessions.validate_session(&token).await {
            Ok(Some(session)) => match state.directory.get(session.identity_id).await {
                Ok(Some(identity)) => {
                    request.extensions_mut().insert(identity);
                    request.extensions_mut().insert(SessionToken(token));
                }
                Ok(None) => debug!("Session points at removed identity {}", session.identity_id),
                Err(e) => warn!("Identity lookup failed during authentication: {e}"),
            },
            Ok(None) => debug!("Unknown or expired session token"),
            Err(e) => warn!("Session validation failed: {e}"),
        }
    }

    next.run(request).await
}

/// Roles admitted by a route group. Empty admits any signed-in identity.
#[derive(Debug, Clone, Default)]
pub struct RoleGate {
    roles: Vec<Role>,
}

impl RoleGate {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(roles: &[Role]) -> Self {
        Self {
            roles: roles.to_vec(),
        }
    }
}

pub async fn require_roles(
    State(gate): State<RoleGate>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, PortalError> {
    let identity = request.extensions().get::<Identity>();
    let decision = authorize(identity, false, &gate.roles);

    match decision {
        AccessDecision::Allow => Ok(next.run(request).await),
        AccessDecision::DenyRedirect(redirect) if !redirect.is_login() => {
            warn!(
                "Role check failed for {} on {}: requires one of {:?}",
                identity.map(|i| i.id.to_string()).unwrap_or_default(),
                request.uri().path(),
                gate.roles
            );
            Err(PortalError::Forbidden("Insufficient role for this resource".into()))
        }
        _ => Err(PortalError::Unauthorized("Authentication required".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_preferred_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(COOKIE, HeaderValue::from_static("sd=fromcookie"));
        assert_eq!(extract_token(&headers, "sd").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; sd=xyz"));
        assert_eq!(extract_token(&headers, "sd").as_deref(), Some("xyz"));
        assert_eq!(extract_token(&HeaderMap::new(), "sd"), None);
    }
}
