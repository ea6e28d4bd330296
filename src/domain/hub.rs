//! Distribution hub: fans each verified event out to every live subscriber.
//!
//! Every subscriber owns a bounded queue. [`Hub::publish`] snapshots the
//! registry, offers the event to each queue without waiting, and evicts any
//! subscriber whose queue is full or already closed. The external relay, if
//! configured, gets the same event afterwards on a fire-and-forget basis.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::subscriber_registry::{SubscriberHandle, SubscriberRegistry};
use super::{SubscriberId, WebhookEvent};
use crate::error::DeliveryFault;
use crate::relay::Relay;

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Number of subscriber queues the event was placed on.
    pub delivered: usize,
    /// Subscribers evicted during this pass.
    pub faults: Vec<DeliveryFault>,
}

/// Event distribution hub.
///
/// Shared behind an `Arc` by the webhook handler (producer) and the
/// WebSocket session loops (consumers). Fan-out passes are serialized, so
/// every subscriber observes events in the same order `publish` was called.
#[derive(Debug)]
pub struct Hub {
    registry: SubscriberRegistry,
    relay: Option<Relay>,
    fanout: Mutex<()>,
    published: AtomicU64,
}

impl Hub {
    /// Creates a hub whose subscribers get queues of `queue_capacity`
    /// events, optionally forwarding to `relay`.
    #[must_use]
    pub fn new(queue_capacity: usize, relay: Option<Relay>) -> Self {
        Self {
            registry: SubscriberRegistry::new(queue_capacity),
            relay,
            fanout: Mutex::new(()),
            published: AtomicU64::new(0),
        }
    }

    /// Returns the subscriber registry.
    #[must_use]
    pub const fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Returns `true` if events are also forwarded to the external relay.
    #[must_use]
    pub const fn relay_enabled(&self) -> bool {
        self.relay.is_some()
    }

    /// Returns how many events have been published since startup.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Registers a new subscriber.
    pub async fn subscribe(&self) -> SubscriberHandle {
        let handle = self.registry.register().await;
        debug!(subscriber = %handle.id(), "subscriber registered");
        handle
    }

    /// Removes a subscriber. Safe to call for one that was already evicted.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry.deregister(id).await
    }

    /// Fans `event` out to every currently registered subscriber.
    ///
    /// Returns once the event has been offered to every queue in the
    /// snapshot, not once it has been written to any socket. A subscriber
    /// whose queue is full misses this event and is evicted before the next
    /// pass starts; other subscribers are unaffected.
    pub async fn publish(&self, event: WebhookEvent) -> FanoutReport {
        let event = Arc::new(event);
        let _pass = self.fanout.lock().await;

        let mut report = FanoutReport::default();
        self.registry
            .for_each_active(|id, sender| match sender.try_send(Arc::clone(&event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.faults.push(DeliveryFault::QueueFull(id)),
                Err(TrySendError::Closed(_)) => {
                    report.faults.push(DeliveryFault::Disconnected(id));
                }
            })
            .await;

        for fault in &report.faults {
            if self.registry.deregister(fault.subscriber()).await {
                warn!(
                    subscriber = %fault.subscriber(),
                    event = %event.event,
                    fault = %fault,
                    "evicting subscriber"
                );
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);

        if let Some(relay) = &self.relay
            && let Err(e) = relay.relay(&event)
        {
            warn!(
                event = %event.event,
                channel = relay.channel(),
                error = %e,
                "event not relayed"
            );
        }

        debug!(
            event = %event.event,
            delivered = report.delivered,
            evicted = report.faults.len(),
            "event published"
        );
        report
    }

    /// Drops every subscriber so their session loops drain and close.
    ///
    /// Waits for an in-flight fan-out pass to finish first.
    pub async fn shutdown(&self) -> usize {
        let _pass = self.fanout.lock().await;
        self.registry.clear().await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::relay::EventSink;
    use crate::relay::forwarder::tests::{FailingSink, RecordingSink};

    fn event(kind: &str) -> WebhookEvent {
        WebhookEvent::new(kind)
    }

    async fn drain(handle: &mut SubscriberHandle, n: usize) -> Vec<String> {
        let mut kinds = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(e) = handle.next_event().await else {
                panic!("queue closed early");
            };
            kinds.push(e.event.clone());
        }
        kinds
    }

    #[tokio::test]
    async fn publish_without_subscribers_delivers_nothing() {
        let hub = Hub::new(8, None);
        let report = hub.publish(event("room_started")).await;
        assert_eq!(report.delivered, 0);
        assert!(report.faults.is_empty());
        assert_eq!(hub.published_count(), 1);
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_event_in_order() {
        let hub = Hub::new(16, None);
        let mut a = hub.subscribe().await;
        let mut b = hub.subscribe().await;

        let kinds = ["room_started", "participant_joined", "track_published"];
        for kind in kinds {
            let report = hub.publish(event(kind)).await;
            assert_eq!(report.delivered, 2);
        }

        assert_eq!(drain(&mut a, 3).await, kinds);
        assert_eq!(drain(&mut b, 3).await, kinds);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_events() {
        let hub = Hub::new(8, None);
        let mut early = hub.subscribe().await;
        hub.publish(event("first")).await;
        let mut late = hub.subscribe().await;
        hub.publish(event("second")).await;

        assert_eq!(drain(&mut early, 2).await, ["first", "second"]);
        assert_eq!(drain(&mut late, 1).await, ["second"]);
    }

    #[tokio::test]
    async fn stalled_subscriber_is_evicted_without_affecting_others() {
        let hub = Hub::new(2, None);
        let mut healthy = hub.subscribe().await;
        let mut stalled = hub.subscribe().await;
        let stalled_id = stalled.id();

        let mut received = Vec::new();
        let mut evicted_at = None;
        for i in 0..5 {
            let report = hub.publish(event(&format!("e{i}"))).await;
            if report.faults.contains(&DeliveryFault::QueueFull(stalled_id)) {
                evicted_at = Some(i);
            }
            received.extend(drain(&mut healthy, 1).await);
        }

        assert_eq!(evicted_at, Some(2));
        assert_eq!(received, ["e0", "e1", "e2", "e3", "e4"]);
        assert!(!hub.registry().contains(stalled_id).await);
        assert!(stalled.is_evicted());
        assert!(!healthy.is_evicted());

        // The stalled queue holds what fit before eviction, then closes.
        assert_eq!(drain(&mut stalled, 2).await, ["e0", "e1"]);
        assert!(stalled.next_event().await.is_none());
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed_on_next_pass() {
        let hub = Hub::new(4, None);
        let gone = hub.subscribe().await;
        let gone_id = gone.id();
        drop(gone);

        let report = hub.publish(event("room_started")).await;
        assert_eq!(report.faults, vec![DeliveryFault::Disconnected(gone_id)]);
        assert!(hub.registry().is_empty().await);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let hub = Hub::new(4, None);
        let handle = hub.subscribe().await;
        assert!(hub.unsubscribe(handle.id()).await);
        assert!(!hub.unsubscribe(handle.id()).await);
    }

    #[tokio::test]
    async fn relay_receives_published_events() {
        let sink = Arc::new(RecordingSink::default());
        let relay = Relay::start(
            Arc::clone(&sink) as Arc<dyn EventSink>,
            "livekit".to_string(),
            8,
        );
        let hub = Hub::new(4, Some(relay));
        assert!(hub.relay_enabled());

        hub.publish(event("room_started")).await;

        for _ in 0..100 {
            if !sink.published.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let published = sink.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(
            published.first().map(|(_, p)| p.as_slice()),
            Some(br#"{"event":"room_started"}"#.as_slice())
        );
    }

    #[tokio::test]
    async fn relay_failures_do_not_affect_delivery() {
        let sink = Arc::new(FailingSink::default());
        let relay = Relay::start(
            Arc::clone(&sink) as Arc<dyn EventSink>,
            "livekit".to_string(),
            8,
        );
        let hub = Hub::new(4, Some(relay));
        let mut subscriber = hub.subscribe().await;

        for kind in ["a", "b"] {
            let report = hub.publish(event(kind)).await;
            assert_eq!(report.delivered, 1);
            assert!(report.faults.is_empty());
        }
        assert_eq!(drain(&mut subscriber, 2).await, ["a", "b"]);

        for _ in 0..100 {
            if sink.attempts.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_all_queues() {
        let hub = Hub::new(4, None);
        let mut a = hub.subscribe().await;
        let mut b = hub.subscribe().await;
        assert_eq!(hub.shutdown().await, 2);
        assert!(a.is_evicted() && b.is_evicted());
        assert!(a.next_event().await.is_none());
        assert!(b.next_event().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_and_publish() {
        let hub = Arc::new(Hub::new(64, None));
        let mut churners = Vec::new();

        for _ in 0..16 {
            let hub = Arc::clone(&hub);
            churners.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let handle = hub.subscribe().await;
                    tokio::task::yield_now().await;
                    hub.unsubscribe(handle.id()).await;
                }
            }));
        }

        let mut stayer = hub.subscribe().await;
        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..50 {
                    hub.publish(event(&format!("e{i}"))).await;
                }
            })
        };

        for churner in churners {
            assert!(churner.await.is_ok());
        }
        assert!(publisher.await.is_ok());

        assert_eq!(hub.registry().len().await, 1);
        assert!(hub.registry().contains(stayer.id()).await);
        let expected: Vec<String> = (0..50).map(|i| format!("e{i}")).collect();
        assert_eq!(drain(&mut stayer, 50).await, expected);
    }
}
