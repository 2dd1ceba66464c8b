//! Call tracking for test doubles.
//!
//! [`CallTracker`] records the arguments of every call made to a hand-written
//! fake, stamped with the time of the call. Clones share the same history, so
//! a tracker can be moved into a fake and inspected from the test.
//!
//! Stamp calls with a [`TimeSource`] to see them in virtual time:
//!
//! ```rust
//! use asyncwait::mock::CallTracker;
//! use asyncwait::timers::FakeTimers;
//! use std::time::Duration;
//!
//! let timers = FakeTimers::new();
//! let tracker = CallTracker::with_clock(timers.clock().clone());
//!
//! let fake = tracker.clone();
//! let _ = timers.set_timeout(Duration::from_secs(2), move || fake.track("tick"));
//! timers.advance(Duration::from_secs(2));
//!
//! let call = tracker.last_call().unwrap();
//! assert_eq!(call.args, "tick");
//! assert_eq!(call.timestamp, Duration::from_secs(2));
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::TimeSource;

/// A single recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCall<A> {
    /// The arguments passed to the call.
    pub args: A,
    /// When the call was made, relative to the tracker's clock.
    pub timestamp: Duration,
}

#[derive(Clone)]
enum Stamp {
    Wall(Instant),
    Source(Arc<dyn TimeSource>),
}

impl Stamp {
    fn now(&self) -> Duration {
        match self {
            Self::Wall(created_at) => created_at.elapsed(),
            Self::Source(clock) => clock.now(),
        }
    }
}

/// Records calls without wrapping a function.
pub struct CallTracker<A> {
    calls: Arc<Mutex<Vec<TrackedCall<A>>>>,
    stamp: Stamp,
}

impl<A: Clone> CallTracker<A> {
    /// Create a tracker that stamps calls with wall-clock time since creation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            stamp: Stamp::Wall(Instant::now()),
        }
    }

    /// Create a tracker that stamps calls with `clock`.
    #[must_use]
    pub fn with_clock<C: TimeSource + 'static>(clock: C) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            stamp: Stamp::Source(Arc::new(clock)),
        }
    }

    /// Record a call with the given arguments.
    pub fn track(&self, args: A) {
        let timestamp = self.stamp.now();
        self.calls.lock().push(TrackedCall { args, timestamp });
    }

    /// All tracked calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<TrackedCall<A>> {
        self.calls.lock().clone()
    }

    /// Number of tracked calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Check if any calls were tracked.
    #[must_use]
    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// Check if called exactly `n` times.
    #[must_use]
    pub fn was_called_times(&self, n: usize) -> bool {
        self.call_count() == n
    }

    /// Check if any call had the given arguments.
    #[must_use]
    pub fn was_called_with(&self, expected: &A) -> bool
    where
        A: PartialEq,
    {
        self.calls.lock().iter().any(|c| &c.args == expected)
    }

    /// The `n`th tracked call (0-indexed).
    #[must_use]
    pub fn nth_call(&self, n: usize) -> Option<TrackedCall<A>> {
        self.calls.lock().get(n).cloned()
    }

    /// The most recent tracked call.
    #[must_use]
    pub fn last_call(&self) -> Option<TrackedCall<A>> {
        self.calls.lock().last().cloned()
    }

    /// Forget every tracked call.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

impl<A: Clone> Default for CallTracker<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for CallTracker<A> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
            stamp: self.stamp.clone(),
        }
    }
}

impl<A: Debug> Debug for CallTracker<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTracker")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}
