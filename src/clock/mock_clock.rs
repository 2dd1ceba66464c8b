//! `MockClock` implementation for virtual time control.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::sleep::{MockSleep, SleepState};

/// A mock clock that provides virtual time control for async tests.
///
/// Time only moves when you call [`advance`](MockClock::advance) or
/// [`advance_to`](MockClock::advance_to), and it never moves backwards, so
/// elapsed-time arithmetic done against it stays monotonic.
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned and shared across threads.
/// All clones share the same underlying time state.
///
/// # Example
///
/// ```rust
/// use asyncwait::clock::MockClock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Duration::ZERO);
///
/// let clock2 = clock.clone();
/// clock2.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    pub(crate) inner: Arc<ClockInner>,
}

#[derive(Debug)]
pub(crate) struct ClockInner {
    /// Current virtual time
    current_time: Mutex<Duration>,
    /// Pending sleeps
    pub(crate) sleeps: Mutex<SleepState>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a new `MockClock` starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(Duration::ZERO)
    }

    /// Creates a new `MockClock` starting at the specified time.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::with_start_time(Duration::from_secs(100));
    /// assert_eq!(clock.now(), Duration::from_secs(100));
    /// ```
    #[must_use]
    pub fn with_start_time(start: Duration) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                current_time: Mutex::new(start),
                sleeps: Mutex::new(SleepState::new()),
            }),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        *self.inner.current_time.lock()
    }

    /// Advances the clock by the specified duration.
    ///
    /// Every pending sleep whose deadline is now in the past is woken. The
    /// woken tasks still have to be polled by whatever executor owns them;
    /// use [`FakeTimers`](crate::timers::FakeTimers) to also run them.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// clock.advance(Duration::from_secs(10));
    /// clock.advance(Duration::from_millis(500));
    /// assert_eq!(clock.now(), Duration::from_millis(10_500));
    /// ```
    pub fn advance(&self, duration: Duration) {
        let new_time = {
            let mut now = self.inner.current_time.lock();
            *now = now.saturating_add(duration);
            *now
        };
        self.wake_expired(new_time);
    }

    /// Advances the clock to a specific time.
    ///
    /// This method only moves time forward - if the specified time
    /// is less than or equal to the current time, this is a no-op.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// clock.advance_to(Duration::from_secs(10));
    ///
    /// // Trying to go backwards is a no-op
    /// clock.advance_to(Duration::from_secs(5));
    /// assert_eq!(clock.now(), Duration::from_secs(10));
    /// ```
    pub fn advance_to(&self, time: Duration) {
        let new_time = {
            let mut now = self.inner.current_time.lock();
            if time > *now {
                *now = time;
            }
            *now
        };
        self.wake_expired(new_time);
    }

    /// Creates a sleep future that completes when virtual time advances past its deadline.
    ///
    /// The deadline is fixed when the sleep is created, not when it is first polled.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> MockSleep {
        MockSleep::new(self.clone(), duration)
    }

    /// Creates a sleep future that completes once virtual time reaches `deadline`.
    #[must_use]
    pub fn sleep_until(&self, deadline: Duration) -> MockSleep {
        MockSleep::until(self.clone(), deadline)
    }

    /// Returns the earliest deadline among registered sleeps.
    ///
    /// Sleeps are registered when first polled, not when created.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.sleeps.lock().next_deadline()
    }

    /// Returns the number of registered sleeps waiting to complete.
    ///
    /// ```rust
    /// use asyncwait::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// let _sleep = clock.sleep(Duration::from_secs(10));
    ///
    /// // Not polled yet, so not registered
    /// assert_eq!(clock.pending_count(), 0);
    /// ```
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.sleeps.lock().pending_count()
    }

    fn wake_expired(&self, now: Duration) {
        let wakers = self.inner.sleeps.lock().take_expired(now);
        if !wakers.is_empty() {
            tracing::trace!(now = ?now, woken = wakers.len(), "mock clock woke sleeps");
        }
        for waker in wakers {
            waker.wake();
        }
    }
}
