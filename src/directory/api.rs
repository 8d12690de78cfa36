use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Identity, IdentityPatch, Registration, Role};
use crate::core::error::{PortalError, PortalResult};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::middleware::{require_roles, RoleGate};

pub async fn list_users(State(state): State<Arc<AppState>>) -> PortalResult<Json<Vec<Identity>>> {
    let mut users = state.directory.list().await?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Json(registration): Json<Registration>,
) -> PortalResult<(StatusCode, Json<Identity>)> {
    registration.validate()?;
    let identity = state.directory.sign_up(registration).await?;
    info!(
        "Admin {} created {} account {}",
        admin.id, identity.role, identity.id
    );
    Ok((StatusCode::CREATED, Json(identity)))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<Identity>> {
    state
        .directory
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| PortalError::NotFound(format!("User {id}")))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<IdentityPatch>,
) -> PortalResult<Json<Identity>> {
    Ok(Json(state.directory.update(id, patch).await?))
}

/// Removes the account with its live sessions and notification feed, and unassigns
/// the tickets it was handling.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> PortalResult<StatusCode> {
    if admin.id == id {
        return Err(PortalError::Validation(
            "Administrators cannot delete their own account".into(),
        ));
    }

    state.directory.remove(id).await?;

    match state.sessions.revoke_identity_sessions(id).await {
        Ok(count) if count > 0 => info!("Revoked {count} sessions of removed user {id}"),
        Ok(_) => {}
        Err(e) => warn!("Failed to revoke sessions of removed user {id}: {e}"),
    }
    state.tickets.release_agent(id).await;
    state.notifications.forget(id).await;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::USERS, get(list_users).post(create_user))
        .route(
            ApiUrls::USER_BY_ID,
            get(get_user).put(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            RoleGate::roles(&[Role::Admin]),
            require_roles,
        ))
}
