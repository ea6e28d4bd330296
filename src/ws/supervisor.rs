//! Tracks live session tasks so shutdown can wait for them.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;

/// Owns the settings and bookkeeping shared by every session task.
///
/// Session tasks are spawned by the WebSocket upgrade, outside the HTTP
/// server's own connection tracking, so graceful shutdown waits on this
/// tracker instead.
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    tracker: TaskTracker,
    write_timeout: Duration,
}

impl SessionSupervisor {
    /// Creates a supervisor whose sessions give up on a single socket write
    /// after `write_timeout`.
    #[must_use]
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            write_timeout,
        }
    }

    /// Returns the per-write timeout applied by every session.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns the number of sessions still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Runs `session` to completion while counting it as active.
    pub async fn supervise<F>(&self, session: F) -> F::Output
    where
        F: Future,
    {
        self.tracker.track_future(session).await
    }

    /// Waits up to `limit` for every session to finish.
    ///
    /// Returns `true` if all sessions finished in time.
    pub async fn drain(&self, limit: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(limit, self.tracker.wait()).await.is_ok()
    }
}
