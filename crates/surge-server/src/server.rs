//! HTTP/WebSocket server surface.

use crate::auth::{self, TokenVerifier};
use crate::config::Config;
use crate::connection;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use surge_core::{Backplane, ConnectionRegistry, EventBroadcaster, RoomRouter};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Connection identities and memberships.
    pub registry: Arc<ConnectionRegistry>,
    /// Room subscription and local fan-out.
    pub router: Arc<RoomRouter>,
    /// Domain event entry points.
    pub broadcaster: Arc<EventBroadcaster>,
    /// Cross-process publish channel.
    pub backplane: Arc<dyn Backplane>,
    /// Handshake credential verification.
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Wire up registry, router, and broadcaster around the given backplane
    /// and verifier.
    #[must_use]
    pub fn new(
        config: Config,
        backplane: Arc<dyn Backplane>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(RoomRouter::with_config(
            registry.clone(),
            config.router_config(),
        ));
        let broadcaster = Arc::new(EventBroadcaster::new(router.clone(), backplane.clone()));

        Self {
            config,
            registry,
            router,
            broadcaster,
            backplane,
            verifier,
        }
    }
}

/// Run the HTTP/WebSocket server until it fails or is shut down.
///
/// # Errors
///
/// Returns an error if the bind address is invalid, an allowed origin cannot
/// be parsed, or the listener fails.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let cors = cors_layer(&state.config.allowed_origins)?;

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state.clone());

    let addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Surge server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the CORS layer from the configured origin list. `"*"` anywhere in
/// the list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    if allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new().allow_origin(Any).allow_methods(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid allowed origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any))
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len(),
        "rooms": state.router.stats().room_count,
        "backplane": state.backplane.status().as_str(),
    }))
}

/// WebSocket upgrade handler. The bearer credential is captured here, before
/// the upgrade, because browsers cannot set headers on WebSocket requests and
/// send the token as a query parameter instead.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let token = auth::bearer_token(&params, &headers);
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticVerifier;
    use surge_backplane::NullBackplane;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Config::default(),
            Arc::new(NullBackplane::new()),
            Arc::new(StaticVerifier::new()),
        ))
    }

    #[test]
    fn test_app_state_wiring() {
        let state = test_state();
        assert!(state.registry.is_empty());
        assert_eq!(state.router.stats().room_count, 0);
    }

    #[test]
    fn test_cors_wildcard() {
        assert!(cors_layer(&["*".to_string()]).is_ok());
    }

    #[test]
    fn test_cors_explicit_origins() {
        assert!(cors_layer(&["https://app.example.com".to_string()]).is_ok());
        assert!(cors_layer(&["https://bad\norigin".to_string()]).is_err());
    }
}
