//! Trusted-origin admission for the webhook endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::app_state::AppState;
use crate::error::HubError;

/// Header carrying the client address when behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Ordered set of trusted webhook origins.
///
/// Entries are compared by exact string equality against the peer IP and,
/// when present, the whole `X-Forwarded-For` value. No prefix or CIDR
/// matching. An empty list admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustList {
    entries: Vec<String>,
}

impl TrustList {
    /// Creates a trust list from the configured entries.
    #[must_use]
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Returns `true` if filtering is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Returns the configured entries.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Decides whether a request from `remote_addr` may proceed.
    #[must_use]
    pub fn admit(&self, remote_addr: &str, forwarded_for: Option<&str>) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries
            .iter()
            .any(|trusted| trusted == remote_addr || forwarded_for == Some(trusted.as_str()))
    }
}

/// Middleware rejecting webhook requests from untrusted origins with `403`.
///
/// The peer address comes from [`ConnectInfo`]; a request without it is
/// judged on its forwarded-for header alone.
///
/// # Errors
///
/// Returns [`HubError::Admission`] when the origin is not trusted.
pub async fn origin_filter(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, HubError> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let forwarded_for = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if state
        .trust_list
        .admit(&remote_addr, forwarded_for.as_deref())
    {
        return Ok(next.run(request).await);
    }

    warn!(
        remote_addr = %remote_addr,
        forwarded_for = ?forwarded_for,
        "untrusted webhook origin"
    );
    Err(HubError::Admission {
        remote_addr,
        forwarded_for,
    })
}
