//! axum router: the `/` health endpoint (§6 "Health endpoint") and the
//! `/ws` upgrade that hands a socket off to [`super::session::run`].
//! Modeled on the teacher's `http.rs` background-task pattern.

use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    extract::ws::WebSocketUpgrade,
    response::{IntoResponse, Json},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct GatewayState {
    pub app: Arc<AppState>,
    pub shutdown: broadcast::Sender<()>,
}

async fn health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "roleplay-hub online",
        "connections": state.app.connection_count(),
        "websocket": "/ws",
    }))
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let app = state.app.clone();
    let shutdown = state.shutdown.subscribe();
    ws.on_upgrade(move |socket| super::session::run(socket, app, shutdown))
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}
