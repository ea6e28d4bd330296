//! Publish-channel abstraction used by the relay forwarder.

use std::fmt;

use async_trait::async_trait;

use crate::error::RelayError;

/// An opaque pub/sub destination.
///
/// A call is one delivery attempt for one event: the forwarder treats every
/// error as final and never publishes the same event twice. Inside a call an
/// implementation may follow topology changes (cluster redirects, a
/// reconnect after a dropped link), but must finish or fail within its own
/// write timeout.
#[async_trait]
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Publishes one serialized event on `channel`.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] if the sink is unreachable or rejects the
    /// message.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), RelayError>;
}
