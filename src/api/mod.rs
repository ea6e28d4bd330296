//! HTTP surface: router composition and system endpoints.

pub mod system;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::webhook;
use crate::ws::handler::ws_handler;

/// Builds the complete router: `POST /webhook`, `GET /` (WebSocket) and
/// `GET /health`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(webhook::routes(state.clone()))
        .merge(system::routes())
        .route("/", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
