//! Non-blocking hand-off from the hub to an [`EventSink`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

use super::EventSink;
use crate::domain::WebhookEvent;
use crate::error::RelayError;

/// Front of the relay: a bounded queue drained by one forwarder task.
///
/// [`Relay::relay`] never waits. Events reach the sink in the order they
/// were relayed; a full queue drops the event and reports
/// [`RelayError::QueueFull`] to the caller, which only logs it.
#[derive(Debug)]
pub struct Relay {
    sender: mpsc::Sender<Arc<WebhookEvent>>,
    channel: String,
}

impl Relay {
    /// Spawns the forwarder task publishing onto `channel` through `sink`.
    ///
    /// Must be called from within a Tokio runtime. The task exits once the
    /// `Relay` is dropped and the queue is drained.
    #[must_use]
    pub fn start(sink: Arc<dyn EventSink>, channel: String, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(forward(receiver, sink, channel.clone()));
        Self { sender, channel }
    }

    /// Returns the destination channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Queues `event` for the sink without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::QueueFull`] if the forwarder is behind, or
    /// [`RelayError::Closed`] if it has stopped.
    pub fn relay(&self, event: &Arc<WebhookEvent>) -> Result<(), RelayError> {
        self.sender
            .try_send(Arc::clone(event))
            .map_err(|e| match e {
                TrySendError::Full(_) => RelayError::QueueFull,
                TrySendError::Closed(_) => RelayError::Closed,
            })
    }
}

async fn forward(
    mut receiver: mpsc::Receiver<Arc<WebhookEvent>>,
    sink: Arc<dyn EventSink>,
    channel: String,
) {
    while let Some(event) = receiver.recv().await {
        if let Err(e) = publish_one(sink.as_ref(), &channel, &event).await {
            error!(
                event = %event.event,
                channel = %channel,
                error = %e,
                "failed to relay event"
            );
        }
    }
    debug!(channel = %channel, "relay forwarder stopped");
}

/// Serializes `event` and makes a single publish attempt.
async fn publish_one(
    sink: &dyn EventSink,
    channel: &str,
    event: &WebhookEvent,
) -> Result<(), RelayError> {
    let payload = serde_json::to_vec(event)?;
    sink.publish(channel, payload).await
}
