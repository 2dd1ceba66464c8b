//! Fake timers: virtual time plus a microtask-draining executor.
//!
//! [`FakeTimers`] pairs a [`MockClock`] with a [`TestExecutor`]. Advancing it
//! moves time one timer deadline at a time and, after each step, runs every
//! task that became ready until nothing else can make progress. A timer whose
//! callback awaits other futures, or schedules further timers, therefore
//! completes inside a single [`advance`](FakeTimers::advance) call, with no
//! extra yielding by the test.
//!
//! # Example
//!
//! ```rust
//! use asyncwait::timers::FakeTimers;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let timers = FakeTimers::new();
//! let flag = Arc::new(AtomicBool::new(false));
//!
//! let clock = timers.clock().clone();
//! let flag2 = Arc::clone(&flag);
//! timers.spawn(async move {
//!     clock.sleep(Duration::from_secs(5)).await;
//!     // a second timer started from inside the first
//!     clock.sleep(Duration::from_secs(5)).await;
//!     flag2.store(true, Ordering::SeqCst);
//! });
//!
//! timers.advance(Duration::from_millis(10_100));
//! assert!(flag.load(Ordering::SeqCst));
//! ```

use std::future::Future;
use std::time::Duration;

use crate::clock::MockClock;
use crate::error::{Error, Result};
use crate::executor::{TaskHandle, TestExecutor};

/// Configuration for [`FakeTimers`].
#[derive(Debug, Clone)]
pub struct TimersConfig {
    /// Virtual time the clock starts at.
    pub start_time: Duration,
    /// Maximum number of timer deadlines [`FakeTimers::run_all`] will fire
    /// before giving up.
    pub loop_limit: usize,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            start_time: Duration::ZERO,
            loop_limit: 1000,
        }
    }
}

impl TimersConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial time.
    #[must_use]
    pub fn start_time(mut self, time: Duration) -> Self {
        self.start_time = time;
        self
    }

    /// Set the loop limit used by [`FakeTimers::run_all`].
    #[must_use]
    pub fn loop_limit(mut self, limit: usize) -> Self {
        self.loop_limit = limit;
        self
    }
}

/// A simulated time environment for async tests.
///
/// Tasks run on an internal [`TestExecutor`], and timers are sleeps on the
/// internal [`MockClock`]. Hand [`clock`](FakeTimers::clock) to the code under
/// test wherever it expects a [`TimeSource`](crate::clock::TimeSource).
///
/// Cloning shares the clock and executor.
#[derive(Debug, Clone)]
pub struct FakeTimers {
    clock: MockClock,
    executor: TestExecutor,
    loop_limit: usize,
}

impl Default for FakeTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTimers {
    /// Creates fake timers starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TimersConfig::default())
    }

    /// Creates fake timers from a configuration.
    #[must_use]
    pub fn with_config(config: TimersConfig) -> Self {
        Self {
            clock: MockClock::with_start_time(config.start_time),
            executor: TestExecutor::new(),
            loop_limit: config.loop_limit,
        }
    }

    /// The virtual clock driving these timers.
    #[must_use]
    pub fn clock(&self) -> &MockClock {
        &self.clock
    }

    /// The executor tasks are spawned on.
    #[must_use]
    pub fn executor(&self) -> &TestExecutor {
        &self.executor
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Spawns a task. It first runs on the next drain.
    pub fn spawn<F, T>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    /// Schedules `callback` to run once `delay` of virtual time has passed.
    ///
    /// The timer counts toward [`pending_timers`](Self::pending_timers) right
    /// away. No task runs as part of this call.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::timers::FakeTimers;
    /// use std::time::Duration;
    ///
    /// let timers = FakeTimers::new();
    /// let handle = timers.set_timeout(Duration::from_secs(10), || "fired");
    ///
    /// timers.advance(Duration::from_secs(9));
    /// assert!(!handle.is_complete());
    ///
    /// timers.advance(Duration::from_secs(1));
    /// assert_eq!(handle.take(), Some("fired"));
    /// ```
    pub fn set_timeout<F, T>(&self, delay: Duration, callback: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut sleep = self.clock.sleep(delay);
        // counts as a pending timer before the task first runs
        sleep.register();
        self.executor.spawn(async move {
            sleep.await;
            callback()
        })
    }

    /// Runs every ready task until none is ready. Time does not move.
    ///
    /// Returns the number of polls performed.
    pub fn run_until_stalled(&self) -> usize {
        self.executor.run_until_stalled()
    }

    /// Deadline of the next pending timer, if any.
    #[must_use]
    pub fn next_timer(&self) -> Option<Duration> {
        self.clock.next_deadline()
    }

    /// Number of timers waiting for their deadline.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.clock.pending_count()
    }

    /// Advances virtual time by `duration`, firing timers along the way.
    ///
    /// Timers fire in deadline order. The clock stops at each deadline, and
    /// every task that becomes ready is run to a standstill before the next
    /// deadline is considered, so timers created by earlier timers are
    /// honoured if they fall inside the window. When this returns the clock
    /// reads exactly `now + duration` and all resulting work has run.
    ///
    /// Returns the number of deadlines fired.
    pub fn advance(&self, duration: Duration) -> usize {
        let target = self.clock.now().saturating_add(duration);
        self.advance_until(target)
    }

    /// Advances virtual time to the absolute `target`, like
    /// [`advance`](Self::advance). Targets in the past only drain tasks.
    pub fn advance_until(&self, target: Duration) -> usize {
        self.run_until_stalled();

        let mut fired = 0;
        while let Some(deadline) = self.clock.next_deadline() {
            if deadline > target {
                break;
            }
            self.fire(deadline);
            fired += 1;
        }

        self.clock.advance_to(target);
        self.run_until_stalled();
        tracing::debug!(now = ?self.clock.now(), fired, "fake timers advanced");
        fired
    }

    /// Fires timers until none remain, however far in the future.
    ///
    /// Returns the virtual time at which the last timer fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoopLimit`] if more than the configured loop limit of
    /// deadlines fire, which usually means a timer keeps rescheduling itself.
    pub fn run_all(&self) -> Result<Duration> {
        self.run_until_stalled();

        let mut fired = 0;
        while let Some(deadline) = self.clock.next_deadline() {
            if fired >= self.loop_limit {
                tracing::warn!(limit = self.loop_limit, "fake timers hit the loop limit");
                return Err(Error::LoopLimit(self.loop_limit));
            }
            self.fire(deadline);
            fired += 1;
        }
        Ok(self.clock.now())
    }

    fn fire(&self, deadline: Duration) {
        tracing::trace!(deadline = ?deadline, "firing fake timer");
        self.clock.advance_to(deadline);
        self.run_until_stalled();
    }
}
