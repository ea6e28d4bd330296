//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /`: Upgrade to a WebSocket that receives one text frame per event.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| async move {
        let write_timeout = sessions.write_timeout();
        sessions
            .supervise(run_connection(socket, hub, write_timeout))
            .await;
    })
}
