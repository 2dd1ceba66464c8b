//! The time capability injected into timer-driven code.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::MockClock;

/// Boxed sleep future returned by [`TimeSource::sleep`].
pub type BoxSleep<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A source of time for async operations.
///
/// This trait abstracts over different time implementations, allowing
/// code to work with both real time and mock time. Nothing in this crate
/// reads a process-wide clock; every timer-driven component takes one of
/// these explicitly.
///
/// # Implementations
///
/// - [`MockClock`] - virtual time, advanced by the test
/// - [`TokioClock`](super::TokioClock) - `tokio::time` (with the `tokio` feature)
pub trait TimeSource: Send + Sync {
    /// Get the current time as a monotonic duration since the source's epoch.
    fn now(&self) -> Duration;

    /// Create a future that completes after the given duration.
    fn sleep(&self, duration: Duration) -> BoxSleep<'_>;

    /// Create a future that completes at the given instant.
    fn sleep_until(&self, deadline: Duration) -> BoxSleep<'_> {
        let now = self.now();
        if deadline <= now {
            Box::pin(std::future::ready(()))
        } else {
            self.sleep(deadline - now)
        }
    }
}

impl TimeSource for MockClock {
    fn now(&self) -> Duration {
        MockClock::now(self)
    }

    fn sleep(&self, duration: Duration) -> BoxSleep<'_> {
        Box::pin(MockClock::sleep(self, duration))
    }

    fn sleep_until(&self, deadline: Duration) -> BoxSleep<'_> {
        Box::pin(MockClock::sleep_until(self, deadline))
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) -> BoxSleep<'_> {
        (**self).sleep(duration)
    }

    fn sleep_until(&self, deadline: Duration) -> BoxSleep<'_> {
        (**self).sleep_until(deadline)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) -> BoxSleep<'_> {
        (**self).sleep(duration)
    }

    fn sleep_until(&self, deadline: Duration) -> BoxSleep<'_> {
        (**self).sleep_until(deadline)
    }
}
