use axum::{
    extract::{Query, State},
    http::{header::USER_AGENT, HeaderMap},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::Navigation;
use crate::core::error::{PortalError, PortalResult};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::device::{profile_from_user_agent, DeviceProfile, Viewport};
use crate::directory::Identity;
use crate::session::SessionState;

#[derive(Debug, Deserialize)]
pub struct NavigationQuery {
    pub path: String,
    pub width: Option<u32>,
    #[serde(default)]
    pub touch: bool,
}

fn device_for(state: &AppState, query: &NavigationQuery, headers: &HeaderMap) -> DeviceProfile {
    match query.width {
        Some(width) => state.config.device.profile(Viewport::new(width, query.touch)),
        None => headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(profile_from_user_agent)
            .unwrap_or_else(|| state.config.device.profile(Viewport::new(u32::MAX, false))),
    }
}

/// Resolves a page path for the caller: device redirect first, then the role guard.
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
    headers: HeaderMap,
    Query(query): Query<NavigationQuery>,
) -> PortalResult<Json<Navigation>> {
    if !query.path.starts_with('/') {
        return Err(PortalError::Validation("Path must start with '/'".into()));
    }

    let session = match identity {
        Some(Extension(identity)) => SessionState::signed_in(identity),
        None => SessionState::signed_out(),
    };
    let device = device_for(&state, &query, &headers);

    Ok(Json(state.routes.navigate(&query.path, &session, device)))
}

pub fn configure_navigation_routes() -> Router<Arc<AppState>> {
    Router::new().route(ApiUrls::NAVIGATION, get(navigate))
}
