//! Live subscriber set with snapshot-based iteration.
//!
//! [`SubscriberRegistry`] maps each [`SubscriberId`] to the sending half of
//! that subscriber's bounded outbound queue and an eviction token. The
//! token is cancelled when the entry is removed, so a session blocked in a
//! socket write learns about it without draining its queue. The map is the
//! only shared
//! mutable state in the hub; it sits behind a single [`RwLock`] that is held
//! just long enough to insert, remove or copy out the current membership.
//! Delivery into the queues always happens after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use super::{SubscriberId, WebhookEvent};

/// Sending half of a subscriber's outbound queue.
pub type EventSender = mpsc::Sender<Arc<WebhookEvent>>;

/// Owned by the session loop that registered it.
///
/// Holds the receiving half of the outbound queue. Once the registry drops
/// the matching sender (deregistration, eviction or shutdown), the queue
/// drains and [`SubscriberHandle::next_event`] returns `None`, and
/// [`SubscriberHandle::evicted`] resolves.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<WebhookEvent>>,
    evicted: CancellationToken,
}

#[derive(Debug)]
struct Entry {
    sender: EventSender,
    evicted: CancellationToken,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.evicted.cancel();
    }
}

impl SubscriberHandle {
    /// Returns the session handle.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next queued event.
    ///
    /// Returns `None` once the subscriber is no longer registered and its
    /// queue is empty.
    pub async fn next_event(&mut self) -> Option<Arc<WebhookEvent>> {
        self.receiver.recv().await
    }

    /// Returns a token that is cancelled once the subscriber has been
    /// removed from the registry.
    #[must_use]
    pub fn eviction(&self) -> CancellationToken {
        self.evicted.clone()
    }

    /// Returns `true` if the subscriber has been removed from the registry.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}

/// Set of live subscribers keyed by session handle.
///
/// # Concurrency
///
/// - `register`, `deregister` and `clear` take the write lock.
/// - `snapshot` and `for_each_active` take the read lock only to clone the
///   senders, so a subscriber joining or leaving mid fan-out is either in
///   the snapshot or not, never half of it.
#[derive(Debug)]
pub struct SubscriberRegistry {
    queue_capacity: usize,
    subscribers: RwLock<HashMap<SubscriberId, Entry>>,
}

impl SubscriberRegistry {
    /// Creates an empty registry whose subscribers get queues of
    /// `queue_capacity` events (at least one).
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the per-subscriber queue capacity.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Registers a new subscriber and returns its handle.
    pub async fn register(&self) -> SubscriberHandle {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let evicted = CancellationToken::new();
        let id = SubscriberId::new();
        let entry = Entry {
            sender,
            evicted: evicted.clone(),
        };
        self.subscribers.write().await.insert(id, entry);
        SubscriberHandle {
            id,
            receiver,
            evicted,
        }
    }

    /// Removes a subscriber and cancels its eviction token. Returns `false`
    /// if it was already gone.
    pub async fn deregister(&self, id: SubscriberId) -> bool {
        self.subscribers.write().await.remove(&id).is_some()
    }

    /// Removes every subscriber, returning how many were registered.
    pub async fn clear(&self) -> usize {
        let mut map = self.subscribers.write().await;
        let count = map.len();
        map.clear();
        count
    }

    /// Copies out the current membership.
    pub async fn snapshot(&self) -> Vec<(SubscriberId, EventSender)> {
        let map = self.subscribers.read().await;
        map.iter()
            .map(|(id, entry)| (*id, entry.sender.clone()))
            .collect()
    }

    /// Calls `f` for every subscriber registered at the time of the call.
    ///
    /// The membership is snapshotted under the lock and `f` runs after the
    /// lock has been released, so `f` may itself call back into the registry.
    pub async fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(SubscriberId, &EventSender),
    {
        for (id, sender) in self.snapshot().await {
            f(id, &sender);
        }
    }

    /// Returns `true` if the subscriber is currently registered.
    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(&id)
    }

    /// Returns the number of live subscribers.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Returns `true` if nobody is subscribed.
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}
