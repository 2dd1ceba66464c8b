//! Bounding a future by a duration on an injected clock.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;

use super::source::{BoxSleep, TimeSource};
use crate::error::{Error, Result};

/// Requires `future` to complete within `duration` of `clock` time.
///
/// This is the outer bound to put around
/// [`poll_until`](crate::poll::poll_until) when it runs with unbounded
/// retries.
///
/// # Example
///
/// ```rust
/// use asyncwait::clock::timeout;
/// use asyncwait::timers::FakeTimers;
/// use std::time::Duration;
///
/// let timers = FakeTimers::new();
/// let clock = timers.clock().clone();
/// let handle = timers.spawn(async move {
///     timeout(&clock, Duration::from_secs(30), futures::future::pending::<()>()).await
/// });
///
/// timers.advance(Duration::from_secs(30));
/// assert!(handle.take().unwrap().unwrap_err().is_timeout());
/// ```
pub fn timeout<'a, C, F>(clock: &'a C, duration: Duration, future: F) -> Timeout<'a, F>
where
    C: TimeSource + ?Sized,
    F: Future,
{
    Timeout {
        future,
        deadline: clock.sleep(duration),
        duration,
    }
}

/// Future returned by [`timeout`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timeout<'a, F> {
    #[pin]
    future: F,
    deadline: BoxSleep<'a>,
    duration: Duration,
}

impl<F: Future> Future for Timeout<'_, F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(output) = this.future.poll(cx) {
            return Poll::Ready(Ok(output));
        }

        match this.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                tracing::debug!(duration = ?this.duration, "future timed out");
                Poll::Ready(Err(Error::Timeout(*this.duration)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
