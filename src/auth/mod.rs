//! Sign-in surface: exchanges directory credentials for an opaque session token.

use axum::{
    extract::State,
    http::{
        header::{SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{PortalError, PortalResult};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::directory::{Identity, Registration, Role};
use crate::security::middleware::SessionToken;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
    pub redirect: &'static str,
}

fn cookie_header(cookie: String) -> PortalResult<HeaderValue> {
    HeaderValue::from_str(&cookie)
        .map_err(|e| PortalError::Internal(format!("Invalid cookie header: {e}")))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> PortalResult<Response> {
    let identity = state.directory.sign_in(&req.email, &req.password).await?;

    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    let session = state
        .sessions
        .create_session(identity.id, user_agent)
        .await
        .map_err(|e| PortalError::Internal(format!("Failed to create session: {e}")))?;
    let cookie = cookie_header(state.sessions.build_cookie(&session))?;

    info!("Identity {} signed in as {}", identity.id, identity.role);

    let body = LoginResponse {
        token: session.token,
        redirect: identity.role.home_path(),
        identity,
        expires_at: session.expires_at,
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Public sign-up creates client accounts. Other roles need an admin caller.
pub async fn register(
    State(state): State<Arc<AppState>>,
    caller: Option<Extension<Identity>>,
    Json(req): Json<RegisterRequest>,
) -> PortalResult<(StatusCode, Json<Identity>)> {
    let role = req.role.unwrap_or(Role::Client);
    if role != Role::Client && !caller.as_ref().is_some_and(|c| c.0.is_admin()) {
        return Err(PortalError::Forbidden(format!(
            "Only administrators can register {role} accounts"
        )));
    }

    let mut registration = Registration::new(&req.email, &req.password, &req.name, role);
    if let Some(department) = req.department.filter(|d| !d.trim().is_empty()) {
        registration = registration.with_department(department);
    }
    registration.validate()?;

    let identity = state.directory.sign_up(registration).await?;
    info!("Registered {} account {}", identity.role, identity.id);
    Ok((StatusCode::CREATED, Json(identity)))
}

/// Always clears the cookie; revocation failures are only logged.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    token: Option<Extension<SessionToken>>,
) -> PortalResult<Response> {
    if let Some(Extension(SessionToken(token))) = token {
        if let Err(e) = state.sessions.revoke_session(&token).await {
            warn!("Failed to revoke session on logout: {e}");
        }
    }
    let cookie = cookie_header(state.sessions.build_logout_cookie())?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}

pub async fn me(identity: Option<Extension<Identity>>) -> PortalResult<Json<Identity>> {
    identity
        .map(|Extension(identity)| Json(identity))
        .ok_or_else(|| PortalError::Unauthorized("Authentication required".into()))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUTH_LOGIN, post(login))
        .route(ApiUrls::AUTH_REGISTER, post(register))
        .route(ApiUrls::AUTH_LOGOUT, post(logout))
        .route(ApiUrls::AUTH_ME, get(me))
}
