//! `POST /webhook` handler.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::routing::post;
use tracing::{info, warn};

use super::origin_filter::origin_filter;
use crate::app_state::AppState;
use crate::error::HubError;

/// `POST /webhook`: Verify a webhook and fan its event out.
///
/// Responds `200` once the event has been queued for every subscriber,
/// regardless of individual subscriber or relay failures.
///
/// # Errors
///
/// Returns [`HubError::Auth`] or [`HubError::Decode`] (both `400`) when
/// verification fails; the hub is not touched in that case.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HubError> {
    let event = state.verifier.verify(&headers, &body).map_err(|e| {
        warn!(error = %e, body_length = body.len(), "webhook verification failed");
        HubError::from(e)
    })?;

    info!(
        event = %event.event,
        id = event.id().unwrap_or_default(),
        "received webhook event"
    );

    state.hub.publish(event).await;
    Ok(StatusCode::OK)
}

/// Webhook route guarded by the origin filter.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route_layer(middleware::from_fn_with_state(state, origin_filter))
}
