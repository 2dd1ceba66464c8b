//! Mock sleep futures and the queue of pending deadlines.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use super::MockClock;

/// Key of a registered sleep: deadline first, then registration order.
type SleepKey = (Duration, u64);

/// Internal state for managing sleeps.
///
/// Entries are ordered by deadline, and sleeps sharing a deadline keep the
/// order in which they were registered.
#[derive(Debug, Default)]
pub(crate) struct SleepState {
    pending: BTreeMap<SleepKey, Option<Waker>>,
    next_id: u64,
}

impl SleepState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new sleep and return its key
    fn register(&mut self, deadline: Duration) -> SleepKey {
        let key = (deadline, self.next_id);
        self.next_id += 1;
        self.pending.insert(key, None);
        key
    }

    fn update_waker(&mut self, key: SleepKey, waker: &Waker) {
        if let Some(slot) = self.pending.get_mut(&key) {
            match slot {
                Some(existing) if existing.will_wake(waker) => {}
                _ => *slot = Some(waker.clone()),
            }
        }
    }

    /// Removes every sleep whose deadline has passed and returns their wakers.
    ///
    /// The caller wakes them after releasing the lock.
    pub(crate) fn take_expired(&mut self, current_time: Duration) -> Vec<Waker> {
        let mut wakers = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > current_time {
                break;
            }
            if let Some(waker) = entry.remove() {
                wakers.push(waker);
            }
        }
        wakers
    }

    fn remove(&mut self, key: SleepKey) {
        self.pending.remove(&key);
    }

    /// Earliest registered deadline.
    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A future that completes when virtual time reaches its deadline.
///
/// Created by [`MockClock::sleep`]. The sleep is registered with the clock on
/// first poll and deregistered when it completes or is dropped, so an
/// abandoned sleep never holds up [`FakeTimers`](crate::timers::FakeTimers).
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct MockSleep {
    clock: MockClock,
    deadline: Duration,
    key: Option<SleepKey>,
}

impl MockSleep {
    pub(crate) fn new(clock: MockClock, duration: Duration) -> Self {
        let deadline = clock.now().saturating_add(duration);
        Self::until(clock, deadline)
    }

    pub(crate) fn until(clock: MockClock, deadline: Duration) -> Self {
        Self {
            clock,
            deadline,
            key: None,
        }
    }

    /// Returns the deadline for this sleep.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Returns the remaining time until this sleep completes.
    ///
    /// Returns `Duration::ZERO` if the deadline has already passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_sub(self.clock.now())
    }

    /// Returns `true` if this sleep has completed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.clock.now() >= self.deadline
    }

    /// Registers the deadline with the clock ahead of the first poll.
    ///
    /// Does nothing if the sleep is already registered or already elapsed.
    pub(crate) fn register(&mut self) {
        let mut sleeps = self.clock.inner.sleeps.lock();
        if self.key.is_none() && self.clock.now() < self.deadline {
            self.key = Some(sleeps.register(self.deadline));
        }
    }
}

impl Future for MockSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut sleeps = this.clock.inner.sleeps.lock();

        if this.clock.now() >= this.deadline {
            if let Some(key) = this.key.take() {
                sleeps.remove(key);
            }
            return Poll::Ready(());
        }

        let key = *this.key.get_or_insert_with(|| sleeps.register(this.deadline));
        sleeps.update_waker(key, cx.waker());
        Poll::Pending
    }
}

impl Drop for MockSleep {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.clock.inner.sleeps.lock().remove(key);
        }
    }
}
