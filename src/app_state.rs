//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::Hub;
use crate::webhook::{EventVerifier, TrustList};
use crate::ws::SessionSupervisor;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Distribution hub shared by the webhook endpoint and all sessions.
    pub hub: Arc<Hub>,
    /// Webhook authenticity check.
    pub verifier: Arc<dyn EventVerifier>,
    /// Trusted webhook origins.
    pub trust_list: Arc<TrustList>,
    /// Live WebSocket sessions and their write timeout.
    pub sessions: SessionSupervisor,
}
