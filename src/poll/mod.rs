//! Poll-until-satisfied: retry a check with backoff inside a time budget.
//!
//! [`poll_until`] replaces blind fixed-duration waits in tests. Instead of
//! sleeping "long enough" and then asserting, it calls the check repeatedly
//! until it succeeds (succeed fast) or the budget runs out (fail fast, with
//! the last failure attached).
//!
//! The clock is always passed in, so the same loop runs against real time
//! ([`TokioClock`](crate::clock::TokioClock)) or simulated time
//! ([`MockClock`](crate::clock::MockClock) driven by
//! [`FakeTimers`](crate::timers::FakeTimers)).
//!
//! # Example
//!
//! ```rust
//! use asyncwait::poll::{poll_until, PollConfig};
//! use asyncwait::timers::FakeTimers;
//! use std::future::ready;
//! use std::time::Duration;
//!
//! let timers = FakeTimers::new();
//! let clock = timers.clock().clone();
//! let config = PollConfig::new()
//!     .max_wait_time(Duration::from_secs(1))
//!     .initial_delay(Duration::from_millis(10))
//!     .backoff_factor(1.0);
//!
//! let handle = timers.spawn(async move {
//!     let mut attempts = 0;
//!     poll_until(&clock, &config, || {
//!         attempts += 1;
//!         ready(if attempts < 3 { Err("not yet") } else { Ok("ok") })
//!     })
//!     .await
//! });
//!
//! timers.advance(Duration::from_secs(1));
//! let result = handle.take().unwrap();
//! assert!(result.is_satisfied());
//! assert_eq!(result.attempts(), 3);
//! ```

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{select, Either};

use crate::clock::TimeSource;
use crate::error::PollTimeout;

/// Smallest wait between two attempts.
///
/// A zero backoff would retry without letting time pass, which never
/// terminates against a simulated clock.
pub const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Configuration for [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Total time budget, measured from the start of the poll.
    pub max_wait_time: Duration,
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after each failed attempt. Values
    /// below 1.0 are treated as 1.0.
    pub backoff_factor: f64,
    /// Ignore `max_wait_time` and retry until the check succeeds. Bound the
    /// poll from outside with [`timeout`](crate::clock::timeout).
    pub allow_unbounded_retries: bool,
    /// Upper bound for a single wait.
    pub max_delay: Option<Duration>,
    /// Wait `initial_delay` (capped by `max_delay`) before the first attempt as well.
    pub delay_first_attempt: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait_time: Duration::from_secs(10),
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            allow_unbounded_retries: false,
            max_delay: None,
            delay_first_attempt: false,
        }
    }
}

impl PollConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total time budget.
    #[must_use]
    pub fn max_wait_time(mut self, max_wait_time: Duration) -> Self {
        self.max_wait_time = max_wait_time;
        self
    }

    /// Set the wait after the first failed attempt.
    #[must_use]
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Retry forever instead of timing out.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.allow_unbounded_retries = true;
        self
    }

    /// Cap every individual wait at `max_delay`.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Wait `initial_delay` before the first attempt.
    #[must_use]
    pub fn delay_first_attempt(mut self) -> Self {
        self.delay_first_attempt = true;
        self
    }

    /// The wait that follows `current`.
    ///
    /// ```rust
    /// use asyncwait::poll::PollConfig;
    /// use std::time::Duration;
    ///
    /// let config = PollConfig::new()
    ///     .backoff_factor(2.0)
    ///     .max_delay(Duration::from_millis(300));
    ///
    /// assert_eq!(config.next_delay(Duration::from_millis(100)), Duration::from_millis(200));
    /// assert_eq!(config.next_delay(Duration::from_millis(200)), Duration::from_millis(300));
    /// ```
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);
        self.capped(next)
    }

    /// The first wait, with `max_delay` applied.
    #[must_use]
    pub fn first_delay(&self) -> Duration {
        self.capped(self.initial_delay)
    }

    fn capped(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}

/// Outcome of a [`poll_until`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T, E> {
    /// The check succeeded.
    Satisfied {
        /// What the successful check returned.
        value: T,
        /// Number of times the check was invoked.
        attempts: u32,
        /// Time from the start of the poll to the successful attempt.
        elapsed: Duration,
    },
    /// The budget ran out first.
    TimedOut {
        /// Number of times the check was invoked, including an attempt
        /// abandoned while still running.
        attempts: u32,
        /// Time from the start of the poll to giving up.
        elapsed: Duration,
        /// Failure of the last completed attempt.
        last_error: Option<E>,
    },
}

impl<T, E> PollResult<T, E> {
    /// Returns `true` if the check succeeded.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Returns `true` if the budget ran out.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Number of times the check was invoked.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// Time spent polling.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Satisfied { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// The successful value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// The last recorded check failure, if the poll timed out after one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Satisfied { .. } => None,
            Self::TimedOut { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Converts into a `Result` for use with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`PollTimeout`] if the poll timed out.
    pub fn into_result(self) -> Result<T, PollTimeout<E>> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::TimedOut {
                attempts,
                elapsed,
                last_error,
            } => Err(PollTimeout {
                attempts,
                elapsed,
                last_error,
            }),
        }
    }
}

/// Calls `check` until it returns `Ok` or the budget in `config` runs out.
///
/// `check` is invoked exactly once per attempt and attempts never overlap.
/// After a failed attempt the loop sleeps on `clock`, starting with
/// `initial_delay` and multiplying by `backoff_factor` each time, with the
/// wait clipped to whatever remains of `max_wait_time`. When the budget is
/// exhausted the poll stops without a further attempt. An attempt still in
/// flight at that moment is dropped and its result discarded.
///
/// Never fails: the outcome, including the last check failure, is reported
/// through [`PollResult`].
pub async fn poll_until<C, F, Fut, T, E>(clock: &C, config: &PollConfig, mut check: F) -> PollResult<T, E>
where
    C: TimeSource + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = clock.now();
    let bounded = !config.allow_unbounded_retries;
    let elapsed = || clock.now().saturating_sub(start);
    let remaining = || config.max_wait_time.saturating_sub(elapsed());

    let mut delay = config.first_delay();
    let mut attempts: u32 = 0;
    let mut last_error = None;

    if config.delay_first_attempt && !delay.is_zero() {
        let wait = if bounded { delay.min(remaining()) } else { delay };
        clock.sleep(wait).await;
    }

    loop {
        attempts = next_attempt(attempts);
        tracing::trace!(attempt = attempts, "polling condition");

        let outcome = if bounded {
            let attempt = pin!(check());
            match select(attempt, clock.sleep(remaining())).await {
                Either::Left((outcome, _)) => outcome,
                Either::Right(((), _)) => {
                    let elapsed = elapsed();
                    tracing::debug!(attempts, elapsed = ?elapsed, "poll budget ran out during an attempt");
                    return PollResult::TimedOut {
                        attempts,
                        elapsed,
                        last_error,
                    };
                }
            }
        } else {
            check().await
        };

        match outcome {
            Ok(value) => {
                let elapsed = elapsed();
                tracing::debug!(attempts, elapsed = ?elapsed, "condition satisfied");
                return PollResult::Satisfied {
                    value,
                    attempts,
                    elapsed,
                };
            }
            Err(err) => last_error = Some(err),
        }

        let wait = delay.max(MIN_BACKOFF);
        if bounded {
            if !remaining().is_zero() {
                let wait = wait.min(remaining());
                tracing::trace!(attempt = attempts, wait = ?wait, "condition not met, backing off");
                clock.sleep(wait).await;
            }
            if remaining().is_zero() {
                let elapsed = elapsed();
                tracing::debug!(attempts, elapsed = ?elapsed, "condition not satisfied in time");
                return PollResult::TimedOut {
                    attempts,
                    elapsed,
                    last_error,
                };
            }
        } else {
            tracing::trace!(attempt = attempts, wait = ?wait, "condition not met, backing off");
            clock.sleep(wait).await;
        }

        delay = config.next_delay(delay);
    }
}

/// Attempt counter step. Saturates so an unbounded poll never overflows.
fn next_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}

/// A clock and a [`PollConfig`] bundled for repeated polls.
///
/// ```rust
/// use asyncwait::poll::{PollConfig, Poller};
/// use asyncwait::timers::FakeTimers;
/// use std::future::ready;
/// use std::time::Duration;
///
/// let timers = FakeTimers::new();
/// let poller = Poller::new(timers.clock().clone(), PollConfig::new());
///
/// let handle = timers.spawn(async move {
///     poller.poll_until(|| ready(Ok::<_, ()>("up"))).await
/// });
/// timers.run_until_stalled();
///
/// let result = handle.take().unwrap();
/// assert_eq!(result.value(), Some(&"up"));
/// assert_eq!(result.attempts(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Poller<C> {
    clock: C,
    config: PollConfig,
}

impl<C: TimeSource> Poller<C> {
    /// Create a poller over `clock`.
    #[must_use]
    pub fn new(clock: C, config: PollConfig) -> Self {
        Self { clock, config }
    }

    /// The injected clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The configuration used for every poll.
    #[must_use]
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// See [`poll_until`].
    pub async fn poll_until<F, Fut, T, E>(&self, check: F) -> PollResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        poll_until(&self.clock, &self.config, check).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::FakeTimers;
    use std::future::ready;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn always_failing(counter: &Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<(), String>> {
        let counter = Arc::clone(counter);
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ready(Err(format!("attempt {n} failed")))
        }
    }

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.max_wait_time, Duration::from_secs(10));
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(!config.allow_unbounded_retries);
        assert_eq!(config.max_delay, None);
        assert!(!config.delay_first_attempt);
    }

    #[test]
    fn test_next_delay_clamps_factor_below_one() {
        let config = PollConfig::new().backoff_factor(0.5);
        assert_eq!(
            config.next_delay(Duration::from_millis(40)),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_next_delay_saturates() {
        let config = PollConfig::new().backoff_factor(1e30);
        assert_eq!(config.next_delay(Duration::from_secs(1)), Duration::MAX);
    }

    #[test]
    fn test_immediately_satisfied_check_runs_once() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let handle = timers.spawn(async move {
            poll_until(&clock, &PollConfig::new(), || {
                calls2.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, ()>(()))
            })
            .await
        });
        timers.advance(Duration::from_secs(60));

        let result = handle.take().unwrap();
        assert_eq!(
            result,
            PollResult::Satisfied {
                value: (),
                attempts: 1,
                elapsed: Duration::ZERO,
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_schedule_until_budget_exhausted() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let check = always_failing(&calls);
        let config = PollConfig::new()
            .max_wait_time(Duration::from_millis(1000))
            .initial_delay(Duration::from_millis(100))
            .backoff_factor(2.0);

        let handle = timers.spawn(async move { poll_until(&clock, &config, check).await });

        // attempts at 0, 100, 300 and 700ms
        timers.advance(Duration::from_millis(699));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        timers.advance(Duration::from_millis(1));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!handle.is_complete());

        timers.advance(Duration::from_millis(300));
        let result = handle.take().unwrap();
        assert!(result.is_timed_out());
        assert_eq!(result.attempts(), 4);
        assert_eq!(result.elapsed(), Duration::from_millis(1000));
        assert_eq!(result.last_error().map(String::as_str), Some("attempt 4 failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_max_delay_caps_backoff() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let check = always_failing(&calls);
        let config = PollConfig::new()
            .max_wait_time(Duration::from_millis(1000))
            .initial_delay(Duration::from_millis(100))
            .backoff_factor(10.0)
            .max_delay(Duration::from_millis(200));

        let handle = timers.spawn(async move { poll_until(&clock, &config, check).await });
        timers.advance(Duration::from_millis(1000));

        // 0, 100, 300, 500, 700, 900
        let result = handle.take().unwrap();
        assert_eq!(result.attempts(), 6);
        assert_eq!(result.elapsed(), Duration::from_millis(1000));
    }

    #[test]
    fn test_max_delay_caps_initial_delay() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let attempt_times = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let times = Arc::clone(&attempt_times);
        let config = PollConfig::new()
            .max_wait_time(Duration::from_millis(1000))
            .initial_delay(Duration::from_millis(500))
            .backoff_factor(1.0)
            .max_delay(Duration::from_millis(100));
        assert_eq!(config.first_delay(), Duration::from_millis(100));

        let poll_clock = clock.clone();
        let handle = timers.spawn(async move {
            poll_until(&poll_clock, &config, || {
                times.lock().push(clock.now());
                ready(Err::<(), _>(()))
            })
            .await
        });
        timers.advance(Duration::from_millis(1000));

        let result = handle.take().unwrap();
        assert_eq!(result.attempts(), 10);
        let expected: Vec<_> = (0..10).map(|n| Duration::from_millis(n * 100)).collect();
        assert_eq!(*attempt_times.lock(), expected);
    }

    #[test]
    fn test_max_delay_caps_first_attempt_delay() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let config = PollConfig::new()
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_millis(50))
            .delay_first_attempt();

        let handle = timers.spawn(async move {
            poll_until(&clock, &config, || ready(Ok::<_, ()>(()))).await
        });
        timers.advance(Duration::from_millis(50));

        let result = handle.take().unwrap();
        assert!(result.is_satisfied());
        assert_eq!(result.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn test_delay_first_attempt() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let config = PollConfig::new()
            .initial_delay(Duration::from_millis(50))
            .delay_first_attempt();

        let handle = timers.spawn(async move {
            poll_until(&clock, &config, || {
                calls2.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, ()>(7))
            })
            .await
        });

        timers.advance(Duration::from_millis(49));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        timers.advance(Duration::from_millis(1));
        let result = handle.take().unwrap();
        assert_eq!(result.value(), Some(&7));
        assert_eq!(result.elapsed(), Duration::from_millis(50));
    }

    #[test]
    fn test_in_flight_attempt_is_discarded_at_deadline() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let config = PollConfig::new().max_wait_time(Duration::from_millis(500));

        let handle = timers.spawn(async move {
            poll_until(&clock, &config, || {
                calls2.fetch_add(1, Ordering::SeqCst);
                futures::future::pending::<Result<(), ()>>()
            })
            .await
        });

        timers.advance(Duration::from_millis(500));
        let result = handle.take().unwrap();
        assert_eq!(
            result,
            PollResult::TimedOut {
                attempts: 1,
                elapsed: Duration::from_millis(500),
                last_error: None,
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending_timers(), 0);
    }

    #[test]
    fn test_unbounded_retries_ignore_budget() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let config = PollConfig::new()
            .max_wait_time(Duration::from_millis(100))
            .initial_delay(Duration::from_millis(100))
            .backoff_factor(1.0)
            .unbounded();

        let handle = timers.spawn(async move {
            poll_until(&clock, &config, || {
                let n = calls2.fetch_add(1, Ordering::SeqCst) + 1;
                ready(if n < 20 { Err(n) } else { Ok(n) })
            })
            .await
        });

        timers.advance(Duration::from_secs(1));
        assert!(!handle.is_complete());

        timers.advance(Duration::from_secs(1));
        let result = handle.take().unwrap();
        assert_eq!(result.value(), Some(&20));
        assert_eq!(result.elapsed(), Duration::from_millis(1900));
    }

    #[test]
    fn test_zero_delay_still_lets_time_pass() {
        let timers = FakeTimers::new();
        let clock = timers.clock().clone();
        let calls = Arc::new(AtomicU32::new(0));
        let check = always_failing(&calls);
        let config = PollConfig::new()
            .max_wait_time(Duration::from_millis(10))
            .initial_delay(Duration::ZERO);

        let handle = timers.spawn(async move { poll_until(&clock, &config, check).await });
        timers.advance(Duration::from_millis(10));

        let result = handle.take().unwrap();
        assert!(result.is_timed_out());
        assert_eq!(result.attempts(), 10);
    }

    #[test]
    fn test_attempt_counter_saturates() {
        assert_eq!(next_attempt(0), 1);
        assert_eq!(next_attempt(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_into_result() {
        let ok: PollResult<u8, ()> = PollResult::Satisfied {
            value: 1,
            attempts: 1,
            elapsed: Duration::ZERO,
        };
        assert_eq!(ok.into_result(), Ok(1));

        let timed_out: PollResult<u8, &str> = PollResult::TimedOut {
            attempts: 3,
            elapsed: Duration::from_secs(1),
            last_error: Some("nope"),
        };
        let err = timed_out.into_result().unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, Some("nope"));
    }
}
