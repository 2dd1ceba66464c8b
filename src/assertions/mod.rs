//! Assertions on individual futures.
//!
//! - [`poll_once`] - Poll a future once without an executor
//! - [`assert_ready!`](crate::assert_ready) - Assert a future is immediately ready
//! - [`assert_pending!`](crate::assert_pending) - Assert a future is not ready
//!
//! # Example
//!
//! ```rust
//! use asyncwait::deferred::deferred;
//! use asyncwait::{assert_pending, assert_ready};
//!
//! let (awaitable, settler) = deferred::<u8, ()>();
//! assert_pending!(awaitable.clone());
//!
//! settler.resolve(1);
//! assert_eq!(assert_ready!(awaitable), Ok(1));
//! ```

use std::future::Future;
use std::task::{Context, Poll};

/// Poll a future once and return the result.
///
/// The future is polled with a no-op waker, so a `Pending` future is simply
/// dropped.
///
/// ```rust
/// use asyncwait::assertions::poll_once;
/// use std::task::Poll;
///
/// assert_eq!(poll_once(async { 42 }), Poll::Ready(42));
/// ```
pub fn poll_once<F: Future>(future: F) -> Poll<F::Output> {
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut pinned = Box::pin(future);
    pinned.as_mut().poll(&mut cx)
}

/// Assert that a future is immediately ready, returning its output.
///
/// # Panics
///
/// Panics if the future returns `Poll::Pending`.
#[macro_export]
macro_rules! assert_ready {
    ($future:expr) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Ready(value) => value,
            ::std::task::Poll::Pending => {
                panic!("assertion failed: expected future to be Ready, but it was Pending");
            }
        }
    }};
    ($future:expr, $($arg:tt)+) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Ready(value) => value,
            ::std::task::Poll::Pending => {
                panic!("assertion failed: expected future to be Ready, but it was Pending: {}", format_args!($($arg)+));
            }
        }
    }};
}

/// Assert that a future is pending (not ready).
///
/// # Panics
///
/// Panics if the future returns `Poll::Ready`.
#[macro_export]
macro_rules! assert_pending {
    ($future:expr) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Pending => {}
            ::std::task::Poll::Ready(value) => {
                panic!(
                    "assertion failed: expected future to be Pending, but it was Ready({:?})",
                    value
                );
            }
        }
    }};
    ($future:expr, $($arg:tt)+) => {{
        match $crate::assertions::poll_once($future) {
            ::std::task::Poll::Pending => {}
            ::std::task::Poll::Ready(value) => {
                panic!(
                    "assertion failed: expected future to be Pending, but it was Ready({:?}): {}",
                    value,
                    format_args!($($arg)+)
                );
            }
        }
    }};
}
