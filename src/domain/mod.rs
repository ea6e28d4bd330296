//! Domain layer: events, subscriber registry and the distribution hub.
//!
//! This module contains the in-process model of the service: the decoded
//! [`WebhookEvent`], the [`SubscriberRegistry`] tracking live sessions, and
//! the [`Hub`] that fans every event out to them.

pub mod hub;
pub mod subscriber_id;
pub mod subscriber_registry;
pub mod webhook_event;

pub use hub::{FanoutReport, Hub};
pub use subscriber_id::SubscriberId;
pub use subscriber_registry::{EventSender, SubscriberHandle, SubscriberRegistry};
pub use webhook_event::WebhookEvent;
