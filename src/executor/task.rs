//! Tasks owned by the [`TestExecutor`](super::TestExecutor).

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures::future::BoxFuture;
use parking_lot::Mutex;

/// Unique identifier for a spawned task.
///
/// Ids grow monotonically across the process, so they also give spawn order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Where a finished task leaves its output.
type Slot<T> = Arc<Mutex<Option<T>>>;

/// Handle to a spawned task's output.
///
/// The output is stored once the task completes and stays there until
/// [`take`](Self::take)n. Clones read the same slot.
pub struct TaskHandle<T> {
    /// The task's unique identifier.
    pub id: TaskId,
    slot: Slot<T>,
}

impl<T> TaskHandle<T> {
    /// Copies the output out if the task has completed.
    #[must_use]
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot.lock().clone()
    }

    /// Moves the output out if the task has completed.
    ///
    /// Returns `None` before completion, and after the output was taken.
    #[must_use]
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Returns true if the task has completed and its output was not taken.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("is_complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

/// A spawned future together with the waker that re-queues it.
///
/// The waker is built on the first poll and reused afterwards, so wakers
/// handed to the same task always compare equal under [`Waker::will_wake`].
pub(crate) struct Task {
    pub id: TaskId,
    future: BoxFuture<'static, ()>,
    waker: Option<Waker>,
}

impl Task {
    /// Wraps `future` so its output lands in the returned handle.
    pub fn spawn<F, T>(future: F) -> (Self, TaskHandle<T>)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = TaskId::next();
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let output = Arc::clone(&slot);
        let task = Self {
            id,
            future: Box::pin(async move {
                let value = future.await;
                *output.lock() = Some(value);
            }),
            waker: None,
        };
        (task, TaskHandle { id, slot })
    }

    /// Polls the task with its own waker, creating it with `make_waker` once.
    pub fn poll_with(&mut self, make_waker: impl FnOnce(TaskId) -> Waker) -> Poll<()> {
        let id = self.id;
        let waker = self.waker.get_or_insert_with(|| make_waker(id));
        let mut cx = Context::from_waker(waker);
        self.future.as_mut().poll(&mut cx)
    }
}
