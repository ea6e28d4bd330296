//! WebSocket layer: connection upgrade and the per-subscriber session loop.
//!
//! The endpoint at `/` is send-only from the server's point of view: every
//! event published through the hub becomes one JSON text frame.

pub mod connection;
pub mod handler;
pub mod supervisor;

pub use supervisor::SessionSupervisor;
