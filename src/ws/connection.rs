//! Subscriber session loop.
//!
//! Each upgraded WebSocket runs one [`run_connection`] task:
//!
//! ```text
//! Connecting -> Registered -> Draining -> Registered -> ... -> Closed
//! ```
//!
//! The task only ever waits on its own queue, its own socket or its own
//! eviction token. Every write is bounded by the write timeout and is
//! abandoned as soon as the hub evicts the subscriber, so a peer that stops
//! reading cannot pin the task. The session always deregisters itself and
//! releases the socket on the way out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Hub, SubscriberId, WebhookEvent};

/// Lifecycle of one subscriber session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded, not yet in the registry.
    Connecting,
    /// In the registry, waiting for the next event.
    Registered,
    /// Writing a dequeued event to the socket.
    Draining,
    /// Finished; deregistered and socket released.
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the stream ended.
    PeerDisconnected,
    /// Writing to the socket failed.
    WriteFailed,
    /// A single write took longer than the write timeout.
    WriteTimedOut,
    /// The hub removed the subscriber (slow consumer or shutdown).
    Deregistered,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PeerDisconnected => "peer_disconnected",
            Self::WriteFailed => "write_failed",
            Self::WriteTimedOut => "write_timed_out",
            Self::Deregistered => "deregistered",
        })
    }
}

/// Runs the session loop for one upgraded connection until it closes.
pub async fn run_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    write_timeout: Duration,
) -> CloseReason {
    let mut state = SessionState::Connecting;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut handle = hub.subscribe().await;
    let id = handle.id();
    let eviction = handle.eviction();
    transition(id, &mut state, SessionState::Registered);
    info!(subscriber = %id, "subscriber connected");

    let reason = loop {
        tokio::select! {
            biased;

            () = eviction.cancelled() => break CloseReason::Deregistered,
            queued = handle.next_event() => {
                let Some(event) = queued else {
                    break CloseReason::Deregistered;
                };
                transition(id, &mut state, SessionState::Draining);
                if let Err(reason) =
                    write_event(&mut ws_tx, &event, write_timeout, &eviction).await
                {
                    warn!(
                        subscriber = %id,
                        event = %event.event,
                        reason = %reason,
                        "websocket write abandoned"
                    );
                    break reason;
                }
                transition(id, &mut state, SessionState::Registered);
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        break CloseReason::PeerDisconnected;
                    }
                    // No client frames are expected; pings are answered by the socket.
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    hub.unsubscribe(id).await;
    // A stalled peer must not hold the close handshake open either.
    if tokio::time::timeout(write_timeout, ws_tx.close()).await.is_err() {
        debug!(subscriber = %id, "close frame not flushed before timeout");
    }
    drop(ws_tx);
    drop(ws_rx);
    transition(id, &mut state, SessionState::Closed);
    info!(subscriber = %id, reason = %reason, "subscriber closed");
    reason
}

/// Writes one event, giving up after `limit` or once `eviction` fires.
async fn write_event<S>(
    ws_tx: &mut S,
    event: &WebhookEvent,
    limit: Duration,
    eviction: &CancellationToken,
) -> Result<(), CloseReason>
where
    S: Sink<Message> + Unpin,
{
    tokio::select! {
        biased;

        () = eviction.cancelled() => Err(CloseReason::Deregistered),
        written = tokio::time::timeout(limit, deliver(ws_tx, event)) => {
            written.unwrap_or(Err(CloseReason::WriteTimedOut))
        }
    }
}

async fn deliver<S>(ws_tx: &mut S, event: &WebhookEvent) -> Result<(), CloseReason>
where
    S: Sink<Message> + Unpin,
{
    let json = match event.to_json() {
        Ok(json) => json,
        Err(e) => {
            // Unserializable events are skipped, not fatal to the session.
            warn!(event = %event.event, error = %e, "failed to serialize event");
            return Ok(());
        }
    };
    ws_tx
        .send(Message::text(json))
        .await
        .map_err(|_| CloseReason::WriteFailed)
}

fn transition(id: SubscriberId, state: &mut SessionState, next: SessionState) {
    debug!(subscriber = %id, from = ?*state, to = ?next, "session state");
    *state = next;
}
