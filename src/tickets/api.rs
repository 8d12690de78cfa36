use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use uuid::Uuid;

use super::{NewTicket, Ticket, TicketPatch, TicketQuery, TicketStats};
use crate::core::error::PortalResult;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::directory::Identity;
use crate::security::middleware::{require_roles, RoleGate};

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_opt<T: std::str::FromStr<Err = crate::core::error::PortalError>>(
    raw: Option<&str>,
) -> PortalResult<Option<T>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// `null` unassigns, absent leaves the assignee alone.
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_agent: Option<Option<Uuid>>,
}

impl UpdateTicketRequest {
    pub fn into_patch(self) -> PortalResult<TicketPatch> {
        Ok(TicketPatch {
            status: parse_opt(self.status.as_deref())?,
            priority: parse_opt(self.priority.as_deref())?,
            title: self.title,
            description: self.description,
            assigned_agent: self.assigned_agent,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assigned_agent: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub reporter: Option<Uuid>,
    pub assigned_agent: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListQuery {
    fn into_query(self) -> PortalResult<TicketQuery> {
        Ok(TicketQuery {
            status: parse_opt(self.status.as_deref())?,
            priority: parse_opt(self.priority.as_deref())?,
            search: self.search,
            reporter: self.reporter,
            assigned_agent: self.assigned_agent,
            limit: Some(self.limit.unwrap_or(50)),
            offset: self.offset,
        })
    }
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateTicketRequest>,
) -> PortalResult<(StatusCode, Json<Ticket>)> {
    let new = NewTicket {
        title: req.title,
        description: req.description,
        priority: parse_opt(req.priority.as_deref())?.unwrap_or_default(),
    };
    let ticket = state.tickets.create(&identity, new).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> PortalResult<Json<Vec<Ticket>>> {
    let query = query.into_query()?;
    Ok(Json(state.tickets.list(&identity, &query).await))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<Ticket>> {
    Ok(Json(state.tickets.get(&identity, id).await?))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> PortalResult<Json<Ticket>> {
    let patch = req.into_patch()?;
    Ok(Json(state.tickets.update(&identity, id, patch).await?))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> PortalResult<Json<Ticket>> {
    Ok(Json(
        state.tickets.assign(&identity, id, req.assigned_agent).await?,
    ))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> PortalResult<Json<Ticket>> {
    let status = req.status.parse()?;
    Ok(Json(state.tickets.change_status(&identity, id, status).await?))
}

pub async fn reopen_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<Ticket>> {
    Ok(Json(state.tickets.reopen(&identity, id).await?))
}

pub async fn get_ticket_stats(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<TicketStats> {
    Json(state.tickets.stats(&identity).await)
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TICKETS, get(list_tickets).post(create_ticket))
        .route(ApiUrls::TICKET_STATS, get(get_ticket_stats))
        .route(ApiUrls::TICKET_BY_ID, get(get_ticket).put(update_ticket))
        .route(ApiUrls::TICKET_ASSIGN, put(assign_ticket))
        .route(ApiUrls::TICKET_STATUS, put(change_status))
        .route(ApiUrls::TICKET_REOPEN, put(reopen_ticket))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::authenticated(),
            require_roles,
        ))
}
