//! Externally settled asynchronous values.
//!
//! [`deferred`] creates a value in the *pending* state and splits it into two
//! handles: an [`Awaitable`] for consumers and a [`Settler`] for whoever
//! decides when, and how, it completes. This decouples *when* a future
//! resolves from *what* computes its value, so a test can hold an operation
//! in flight for as long as it likes and finish it at an exact point.
//!
//! The first settlement wins. Later calls to [`Settler::resolve`] or
//! [`Settler::reject`] are ignored. If every settler is dropped while the
//! value is still pending, waiters see [`DeferredError::Abandoned`].
//!
//! # Example
//!
//! ```rust
//! use asyncwait::deferred::deferred;
//! use asyncwait::executor::TestExecutor;
//!
//! let executor = TestExecutor::new();
//! let (awaitable, settler) = deferred::<&str, String>();
//!
//! let handle = executor.spawn(awaitable);
//! executor.run_until_stalled();
//! assert!(!handle.is_complete());
//!
//! settler.resolve("done");
//! executor.run_until_stalled();
//! assert_eq!(handle.take(), Some(Ok("done")));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use pin_project::pin_project;

use crate::error::DeferredError;

/// Creates a pending deferred value.
///
/// Returns the read handle, given to consumers, and the write handle, kept by
/// whoever controls completion.
#[must_use = "a deferred value needs both an observer and a settler"]
pub fn deferred<T, E>() -> (Awaitable<T, E>, Settler<T, E>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(Inner {
            outcome: Outcome::Pending,
            waiters: BTreeMap::new(),
            next_waiter: 0,
            settlers: 1,
        }),
    });
    (
        Awaitable {
            shared: Arc::clone(&shared),
            slot: None,
        },
        Settler { shared },
    )
}

/// Observable state of a deferred value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Not settled yet.
    Pending,
    /// Resolved with a value.
    Fulfilled,
    /// Rejected with an error.
    Rejected,
    /// Every settler was dropped before settling.
    Abandoned,
}

impl DeferredState {
    /// Returns `true` unless the state is [`DeferredState::Pending`].
    #[must_use]
    pub fn is_settled(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for DeferredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
            Self::Abandoned => f.write_str("abandoned"),
        }
    }
}

struct Shared<T, E> {
    state: Mutex<Inner<T, E>>,
}

struct Inner<T, E> {
    outcome: Outcome<T, E>,
    /// Wakers of pending observers, keyed by registration order.
    waiters: BTreeMap<u64, Waker>,
    next_waiter: u64,
    /// Live `Settler` handles.
    settlers: usize,
}

enum Outcome<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
    Abandoned,
}

impl<T, E> Outcome<T, E> {
    fn state(&self) -> DeferredState {
        match self {
            Self::Pending => DeferredState::Pending,
            Self::Fulfilled(_) => DeferredState::Fulfilled,
            Self::Rejected(_) => DeferredState::Rejected,
            Self::Abandoned => DeferredState::Abandoned,
        }
    }
}

impl<T: Clone, E: Clone> Outcome<T, E> {
    fn observe(&self) -> Option<Result<T, DeferredError<E>>> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(value) => Some(Ok(value.clone())),
            Self::Rejected(err) => Some(Err(DeferredError::Rejected(err.clone()))),
            Self::Abandoned => Some(Err(DeferredError::Abandoned)),
        }
    }
}

impl<T, E> Inner<T, E> {
    /// Stores `waker` in the observer's slot, allocating one on first use.
    fn register(&mut self, slot: &mut Option<u64>, waker: &Waker) {
        if let Some(existing) = slot.and_then(|key| self.waiters.get_mut(&key)) {
            if !existing.will_wake(waker) {
                existing.clone_from(waker);
            }
            return;
        }
        let key = self.next_waiter;
        self.next_waiter += 1;
        self.waiters.insert(key, waker.clone());
        *slot = Some(key);
    }
}

impl<T, E> Shared<T, E> {
    /// Moves a pending value to `outcome` and wakes every waiter.
    ///
    /// Returns `false`, leaving the state untouched, if it was already settled.
    fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let waiters = {
            let mut inner = self.state.lock();
            if !matches!(inner.outcome, Outcome::Pending) {
                tracing::trace!(
                    state = %inner.outcome.state(),
                    attempted = %outcome.state(),
                    "ignoring settlement of already settled deferred"
                );
                return false;
            }
            tracing::trace!(state = %outcome.state(), waiters = inner.waiters.len(), "deferred settled");
            inner.outcome = outcome;
            std::mem::take(&mut inner.waiters)
        };
        for waker in waiters.into_values() {
            waker.wake();
        }
        true
    }
}

/// The write handle of a deferred value.
///
/// Settling never fails: it records the outcome if the value is still
/// pending and does nothing otherwise. Clones share the same value, and
/// dropping the last clone of a pending value abandons it.
pub struct Settler<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Settler<T, E> {
    /// Fulfils the deferred with `value`.
    ///
    /// Returns `true` if this call settled it, `false` if it was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.shared.settle(Outcome::Fulfilled(value))
    }

    /// Rejects the deferred with `error`.
    ///
    /// Returns `true` if this call settled it, `false` if it was already settled.
    pub fn reject(&self, error: E) -> bool {
        self.shared.settle(Outcome::Rejected(error))
    }

    /// Current state of the deferred.
    #[must_use]
    pub fn state(&self) -> DeferredState {
        self.shared.state.lock().outcome.state()
    }
}

impl<T, E> Clone for Settler<T, E> {
    fn clone(&self) -> Self {
        self.shared.state.lock().settlers += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Drop for Settler<T, E> {
    fn drop(&mut self) {
        let last = {
            let mut inner = self.shared.state.lock();
            inner.settlers -= 1;
            inner.settlers == 0
        };
        if last && self.shared.settle(Outcome::Abandoned) {
            tracing::debug!("deferred abandoned: every settler dropped before settling");
        }
    }
}

impl<T, E> fmt::Debug for Settler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// The read handle of a deferred value.
///
/// Awaiting it yields `Ok(value)` once fulfilled, or the
/// [`DeferredError`] describing why there is no value. Any number of clones
/// may wait, before or after settlement, and each receives its own copy of
/// the outcome.
#[must_use = "a deferred value must be observed; use `subscribe` to handle both outcomes"]
pub struct Awaitable<T, E> {
    shared: Arc<Shared<T, E>>,
    /// Key of this handle's waker while it waits.
    slot: Option<u64>,
}

impl<T, E> Awaitable<T, E> {
    /// Current state of the deferred.
    #[must_use]
    pub fn state(&self) -> DeferredState {
        self.shared.state.lock().outcome.state()
    }

    /// Returns `true` once the deferred has left the pending state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// Attaches a pair of continuations.
    ///
    /// Exactly one of them is invoked, exactly once, when the returned
    /// [`Subscription`] is polled after settlement. Nothing runs inside this
    /// call. Subscriptions spawned on a FIFO executor before settlement run in
    /// the order they were first polled.
    ///
    /// Both handlers are required so that a rejection always has somewhere
    /// to go. `on_rejected` also receives [`DeferredError::Abandoned`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::deferred::deferred;
    /// use asyncwait::error::DeferredError;
    /// use asyncwait::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// let (awaitable, settler) = deferred::<u32, &str>();
    ///
    /// let outcome = executor.spawn(awaitable.subscribe(
    ///     |value| format!("got {value}"),
    ///     |err: DeferredError<&str>| format!("failed: {err}"),
    /// ));
    ///
    /// settler.reject("boom");
    /// executor.run_until_stalled();
    /// assert_eq!(outcome.take().as_deref(), Some("failed: deferred was rejected: boom"));
    /// ```
    pub fn subscribe<F, R, O>(&self, on_fulfilled: F, on_rejected: R) -> Subscription<T, E, F, R>
    where
        F: FnOnce(T) -> O,
        R: FnOnce(DeferredError<E>) -> O,
    {
        Subscription {
            awaitable: self.clone(),
            on_fulfilled: Some(on_fulfilled),
            on_rejected: Some(on_rejected),
        }
    }
}

impl<T, E> Clone for Awaitable<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            slot: None,
        }
    }
}

impl<T, E> Drop for Awaitable<T, E> {
    fn drop(&mut self) {
        if let Some(key) = self.slot.take() {
            self.shared.state.lock().waiters.remove(&key);
        }
    }
}

impl<T, E> fmt::Debug for Awaitable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awaitable")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Clone, E: Clone> Future for Awaitable<T, E> {
    type Output = Result<T, DeferredError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut inner = this.shared.state.lock();
        if let Some(outcome) = inner.outcome.observe() {
            // settlement already drained the waiters
            this.slot = None;
            return Poll::Ready(outcome);
        }
        inner.register(&mut this.slot, cx.waker());
        Poll::Pending
    }
}

/// Future returned by [`Awaitable::subscribe`].
///
/// Resolves to whatever the invoked continuation returned.
#[pin_project]
#[must_use = "continuations only run when the subscription is polled"]
pub struct Subscription<T, E, F, R> {
    awaitable: Awaitable<T, E>,
    on_fulfilled: Option<F>,
    on_rejected: Option<R>,
}

impl<T, E, F, R, O> Future for Subscription<T, E, F, R>
where
    T: Clone,
    E: Clone,
    F: FnOnce(T) -> O,
    R: FnOnce(DeferredError<E>) -> O,
{
    type Output = O;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<O> {
        let this = self.project();
        let outcome = match Pin::new(this.awaitable).poll(cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => return Poll::Pending,
        };
        let (Some(on_fulfilled), Some(on_rejected)) =
            (this.on_fulfilled.take(), this.on_rejected.take())
        else {
            panic!("`Subscription` polled after completion");
        };
        Poll::Ready(match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TestExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_deferred_is_pending() {
        let (awaitable, settler) = deferred::<u8, ()>();
        assert_eq!(awaitable.state(), DeferredState::Pending);
        assert_eq!(settler.state(), DeferredState::Pending);
        assert!(!awaitable.is_settled());
    }

    #[test]
    fn test_first_settlement_wins() {
        let (awaitable, settler) = deferred::<u8, &str>();

        assert!(settler.resolve(1));
        assert!(!settler.reject("late"));
        assert!(!settler.resolve(2));

        assert_eq!(awaitable.state(), DeferredState::Fulfilled);
        assert_eq!(
            crate::assertions::poll_once(awaitable),
            Poll::Ready(Ok(1))
        );
    }

    #[test]
    fn test_reject_then_resolve_keeps_rejection() {
        let (awaitable, settler) = deferred::<u8, &str>();

        assert!(settler.reject("x"));
        assert!(!settler.resolve(1));

        assert_eq!(
            crate::assertions::poll_once(awaitable),
            Poll::Ready(Err(DeferredError::Rejected("x")))
        );
    }

    #[test]
    fn test_waiters_registered_before_settlement_are_woken() {
        let executor = TestExecutor::new();
        let (awaitable, settler) = deferred::<String, ()>();

        let first = executor.spawn(awaitable.clone());
        let second = executor.spawn(awaitable.clone());
        executor.run_until_stalled();
        assert_eq!(executor.waiting_count(), 2);

        settler.resolve("v".to_string());
        assert_eq!(executor.pending_count(), 2);

        executor.run_until_stalled();
        assert_eq!(first.take(), Some(Ok("v".to_string())));
        assert_eq!(second.take(), Some(Ok("v".to_string())));

        // Late observer still sees the outcome
        let late = executor.spawn(awaitable);
        executor.run_until_stalled();
        assert_eq!(late.take(), Some(Ok("v".to_string())));
    }

    #[test]
    fn test_repeated_polls_register_one_waker() {
        let (awaitable, _settler) = deferred::<u8, ()>();
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = awaitable.clone();

        for _ in 0..3 {
            assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        }
        assert_eq!(awaitable.shared.state.lock().waiters.len(), 1);

        drop(fut);
        assert!(awaitable.shared.state.lock().waiters.is_empty());
    }

    /// Polls `inner` once per wake-up, `remaining` times, then finishes.
    struct PollRepeatedly<F> {
        inner: F,
        remaining: usize,
    }

    impl<F: Future + Unpin> Future for PollRepeatedly<F> {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.remaining == 0 {
                return Poll::Ready(());
            }
            self.remaining -= 1;
            let _ = Pin::new(&mut self.inner).poll(cx);
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    #[test]
    fn test_repoll_on_executor_keeps_one_waiter() {
        let executor = TestExecutor::new();
        let (awaitable, settler) = deferred::<u8, ()>();

        let handle = executor.spawn(PollRepeatedly {
            inner: awaitable.clone(),
            remaining: 1000,
        });
        for _ in 0..10 {
            executor.step();
        }
        assert_eq!(awaitable.shared.state.lock().waiters.len(), 1);

        executor.run_until_stalled();
        assert_eq!(handle.take(), Some(()));
        assert!(awaitable.shared.state.lock().waiters.is_empty());

        assert!(settler.resolve(1));
        assert_eq!(executor.pending_count(), 0);
    }

    #[test]
    fn test_subscribe_runs_nothing_synchronously() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (awaitable, settler) = deferred::<u8, ()>();
        settler.resolve(3);

        let calls2 = Arc::clone(&calls);
        let subscription = awaitable.subscribe(
            move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(crate::assertions::poll_once(subscription).is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriptions_fire_in_registration_order() {
        let executor = TestExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (awaitable, settler) = deferred::<u8, ()>();

        for id in 0..4 {
            let order = Arc::clone(&order);
            let rejected = Arc::clone(&order);
            executor.spawn(awaitable.subscribe(
                move |v| order.lock().push((id, v)),
                move |_| rejected.lock().push((id, 0)),
            ));
        }
        executor.run_until_stalled();
        assert!(order.lock().is_empty());

        settler.resolve(9);
        executor.run_until_stalled();
        assert_eq!(*order.lock(), vec![(0, 9), (1, 9), (2, 9), (3, 9)]);
    }

    #[test]
    fn test_dropping_last_settler_abandons() {
        let (awaitable, settler) = deferred::<u8, ()>();
        let spare = settler.clone();

        drop(settler);
        assert_eq!(awaitable.state(), DeferredState::Pending);

        drop(spare);
        assert_eq!(awaitable.state(), DeferredState::Abandoned);
        assert_eq!(
            crate::assertions::poll_once(awaitable),
            Poll::Ready(Err(DeferredError::Abandoned))
        );
    }

    #[test]
    fn test_dropping_settled_settler_keeps_outcome() {
        let (awaitable, settler) = deferred::<u8, ()>();
        settler.resolve(1);
        drop(settler);
        assert_eq!(awaitable.state(), DeferredState::Fulfilled);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DeferredState::Pending.to_string(), "pending");
        assert_eq!(DeferredState::Fulfilled.to_string(), "fulfilled");
        assert_eq!(DeferredState::Rejected.to_string(), "rejected");
        assert_eq!(DeferredState::Abandoned.to_string(), "abandoned");
        assert!(!DeferredState::Pending.is_settled());
        assert!(DeferredState::Abandoned.is_settled());
    }
}
