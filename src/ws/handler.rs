//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use super::subscription::SubscriptionManager;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// The bus receiver is created before the upgrade completes, so no event
/// committed after the handshake is missed.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    let service = Arc::clone(&state.service);
    let subs = SubscriptionManager::with_limit(state.ws_max_subscriptions);

    ws.on_upgrade(move |socket| run_connection(socket, event_rx, service, subs))
}
