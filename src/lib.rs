//! # livekit-events
//!
//! Receives signed LiveKit webhooks and redistributes every event to all
//! connected WebSocket subscribers, with an optional best-effort relay to a
//! Redis pub/sub channel.
//!
//! ## Architecture
//!
//! ```text
//! LiveKit ── POST /webhook ──► Origin Filter ──► Verifier ──► Hub
//!                                                            │
//!                      ┌──────────────┬──────────────────────┤
//!                      ▼              ▼                      ▼
//!              subscriber queue  subscriber queue   Relay ─► Redis PUBLISH
//!                      │              │
//!               session loop    session loop
//!                      │              │
//!               WebSocket (GET /)  WebSocket (GET /)
//! ```
//!
//! The hub keeps one bounded queue per subscriber. A subscriber that stops
//! draining its queue is evicted instead of slowing the others down.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod relay;
pub mod webhook;
pub mod ws;
