//! Tokio-backed time source.
//!
//! [`TokioClock`] reads time through `tokio::time`, so it follows real time
//! normally and tokio's own virtual time when the runtime is paused
//! (`#[tokio::test(start_paused = true)]` or `tokio::time::pause()`).
//!
//! ```rust,ignore
//! use asyncwait::clock::{TimeSource, TokioClock};
//! use std::time::Duration;
//!
//! #[tokio::test(start_paused = true)]
//! async fn sleeps_in_virtual_time() {
//!     let clock = TokioClock::new();
//!     clock.sleep(Duration::from_secs(3600)).await; // returns immediately
//!     assert!(clock.now() >= Duration::from_secs(3600));
//! }
//! ```

use std::time::Duration;

use ::tokio::time::Instant;

use super::source::{BoxSleep, TimeSource};

/// Tokio-based time source.
///
/// `now()` is measured from the moment the clock was created. Must be
/// created and used inside a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    /// Create a new Tokio time source whose epoch is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxSleep<'_> {
        Box::pin(::tokio::time::sleep(duration))
    }

    fn sleep_until(&self, deadline: Duration) -> BoxSleep<'_> {
        match self.start.checked_add(deadline) {
            Some(at) => Box::pin(::tokio::time::sleep_until(at)),
            // past what `Instant` can represent
            None => Box::pin(::tokio::time::sleep(Duration::MAX)),
        }
    }
}
