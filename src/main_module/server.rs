//! HTTP server initialization and routing

use axum::http::{header, HeaderValue, Method};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::middleware::auth_middleware;

use super::{health_check, health_check_simple, shutdown_signal};

fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {o}");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        info!("Creating CORS layer with development defaults (no origins configured)");
        base.allow_origin(Any)
    } else {
        info!("Creating CORS layer with {} configured origins", parsed.len());
        base.allow_origin(AllowOrigin::list(parsed))
            .allow_credentials(true)
    }
}

/// Assembles every route group behind the session middleware.
///
/// Layers run outermost first: trace, CORS, then token resolution. Each protected group
/// carries its own role gate as a route layer, so unknown paths still fall through to 404.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(ApiUrls::HEALTH, get(health_check_simple))
        .route(ApiUrls::API_HEALTH, get(health_check))
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::routes::api::configure_navigation_routes())
        .merge(crate::tickets::api::configure_tickets_routes())
        .merge(crate::notifications::api::configure_notifications_routes())
        .merge(crate::directory::api::configure_users_routes());

    api_router
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(create_cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state
        .config
        .server
        .socket_addr()
        .map_err(std::io::Error::other)?;
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
