use crate::config::RelayConfig;
use crate::room::RoomManager;
use crate::signaling::{SignalingService, ws_handler};
use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Everything a connection handler needs. One instance per relay.
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub room_manager: RoomManager,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let signaling = SignalingService::new();
        let room_manager = RoomManager::new(Arc::new(signaling.clone()));

        Self {
            signaling,
            room_manager,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Serves the relay on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Signaling relay listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("relay server stopped")
}

pub async fn run(config: RelayConfig) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    serve(listener, AppState::new(config)).await
}
