use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{Notification, NotificationFilter};
use crate::core::error::{PortalError, PortalResult};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::directory::Identity;
use crate::security::middleware::{require_roles, RoleGate};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    /// `unread`, `read` or `all`.
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub affected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    All,
    Unread,
    Read,
}

fn parse_read_state(raw: Option<&str>) -> PortalResult<ReadState> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("all") => Ok(ReadState::All),
        Some("unread") => Ok(ReadState::Unread),
        Some("read") => Ok(ReadState::Read),
        Some(other) => Err(PortalError::Validation(format!(
            "Unknown notification status: {other}"
        ))),
    }
}

impl NotificationListQuery {
    fn into_filter(self) -> PortalResult<(NotificationFilter, ReadState)> {
        let mut filter = NotificationFilter::new();
        if let Some(category) = NotificationFilter::parse_category(self.category.as_deref())? {
            filter = filter.with_category(category);
        }
        if let Some(search) = self.search.filter(|s| !s.trim().is_empty()) {
            filter = filter.with_search(search);
        }
        Ok((filter, parse_read_state(self.status.as_deref())?))
    }
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<NotificationListQuery>,
) -> PortalResult<Json<NotificationListResponse>> {
    let (filter, read_state) = query.into_filter()?;
    let notifications = state
        .notifications
        .list(identity.id, &filter)
        .await
        .into_iter()
        .filter(|n| match read_state {
            ReadState::All => true,
            ReadState::Unread => !n.is_read,
            ReadState::Read => n.is_read,
        })
        .collect();

    Ok(Json(NotificationListResponse {
        notifications,
        unread_count: state.notifications.unread_count(identity.id).await,
    }))
}

/// Idempotent: unknown or already-read ids answer with `affected: 0`.
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Json<CountResponse> {
    let changed = state.notifications.mark_read(identity.id, id).await;
    Json(CountResponse {
        affected: usize::from(changed),
    })
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<CountResponse> {
    Json(CountResponse {
        affected: state.notifications.mark_all_read(identity.id).await,
    })
}

pub async fn clear_notification(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<CountResponse>> {
    if !state.notifications.clear(identity.id, id).await {
        return Err(PortalError::NotFound(format!("Notification {id}")));
    }
    Ok(Json(CountResponse { affected: 1 }))
}

pub async fn clear_all_notifications(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<CountResponse> {
    Json(CountResponse {
        affected: state.notifications.clear_all(identity.id).await,
    })
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::NOTIFICATIONS,
            get(list_notifications).delete(clear_all_notifications),
        )
        .route(ApiUrls::NOTIFICATIONS_READ_ALL, put(mark_all_read))
        .route(ApiUrls::NOTIFICATION_READ, put(mark_notification_read))
        .route(ApiUrls::NOTIFICATION_BY_ID, delete(clear_notification))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::authenticated(),
            require_roles,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationCategory;

    #[test]
    fn test_query_builds_filter() {
        let query = NotificationListQuery {
            search: Some("printer".into()),
            category: Some("ticket".into()),
            status: Some("Unread".into()),
        };
        let (filter, read_state) = query.into_filter().unwrap();
        assert_eq!(filter.category, Some(NotificationCategory::Ticket));
        assert_eq!(filter.search.as_deref(), Some("printer"));
        assert_eq!(read_state, ReadState::Unread);
    }

    #[test]
    fn test_all_category_and_blank_search() {
        let query = NotificationListQuery {
            search: Some("  ".into()),
            category: Some("all".into()),
            status: None,
        };
        let (filter, read_state) = query.into_filter().unwrap();
        assert_eq!(filter, NotificationFilter::new());
        assert_eq!(read_state, ReadState::All);
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(matches!(
            parse_read_state(Some("archived")),
            Err(PortalError::Validation(_))
        ));
    }
}
