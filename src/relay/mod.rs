//! External relay: best-effort forwarding of every published event to a
//! pub/sub channel.
//!
//! The [`Hub`](crate::domain::Hub) hands events to a [`Relay`] without
//! waiting. A single forwarder task serializes each event and calls the
//! configured [`EventSink`]; failures are logged and the event is dropped.
//! The only production sink is [`RedisSink`] (`PUBLISH channel payload`).

pub mod forwarder;
pub mod redis_sink;
pub mod sink;

pub use forwarder::Relay;
pub use redis_sink::RedisSink;
pub use sink::EventSink;
