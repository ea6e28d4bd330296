//! Session handle for a connected subscriber.
//!
//! [`SubscriberId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so that
//! session handles cannot be confused with other identifiers in logs or maps.

use std::fmt;

/// Unique handle of one live subscriber session.
///
/// Generated when the session registers and never reused. Used as the key
/// in [`super::SubscriberRegistry`] and as the `subscriber` field in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(uuid::Uuid);

impl SubscriberId {
    /// Creates a new random `SubscriberId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
