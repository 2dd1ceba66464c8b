//! The `TestExecutor` implementation.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::task::{Poll, Wake, Waker};

use parking_lot::Mutex;

use crate::executor::task::{Task, TaskHandle, TaskId};

/// A test executor that provides deterministic task execution.
///
/// Unlike production executors, `TestExecutor` doesn't run tasks automatically.
/// Instead, you manually control when tasks execute using [`step`] and
/// [`run_until_stalled`]. Ready tasks are polled strictly in the order they
/// became ready, which makes it behave like a microtask queue: a task woken
/// before another is always resumed before it.
///
/// # Example
///
/// ```rust
/// use asyncwait::executor::TestExecutor;
///
/// let executor = TestExecutor::new();
///
/// let handle = executor.spawn(async { 42 });
/// assert!(!handle.is_complete());
///
/// executor.step();
/// assert_eq!(handle.take(), Some(42));
/// ```
///
/// [`step`]: TestExecutor::step
/// [`run_until_stalled`]: TestExecutor::run_until_stalled
#[derive(Clone)]
pub struct TestExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    /// Queue of tasks ready to be polled.
    ready_queue: Mutex<VecDeque<Task>>,
    /// Tasks that returned Pending and have not been woken since.
    waiting: Mutex<Vec<Task>>,
    /// Tasks woken while they were being polled.
    notified: Mutex<HashSet<TaskId>>,
}

impl TestExecutor {
    /// Creates a new test executor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                ready_queue: Mutex::new(VecDeque::new()),
                waiting: Mutex::new(Vec::new()),
                notified: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Spawns a future on this executor.
    ///
    /// The future will not run until you call [`step`](Self::step) or
    /// [`run_until_stalled`](Self::run_until_stalled).
    ///
    /// Returns a [`TaskHandle`] that can be used to retrieve the result.
    pub fn spawn<F, T>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::spawn(future);
        tracing::trace!(task = %task.id, "task spawned");
        self.inner.ready_queue.lock().push_back(task);
        handle
    }

    /// Returns the number of tasks that are ready to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.ready_queue.lock().len()
    }

    /// Returns the number of tasks waiting to be woken.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.inner.waiting.lock().len()
    }

    /// Returns the total number of active tasks (ready + waiting).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pending_count() + self.waiting_count()
    }

    /// Returns true if there are no active tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Executes one step: polls the task at the front of the ready queue.
    ///
    /// Returns `true` if a task was polled, `false` if the ready queue was empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// let handle = executor.spawn(async { 42 });
    ///
    /// assert!(executor.step());
    /// assert_eq!(handle.take(), Some(42));
    /// assert!(!executor.step());
    /// ```
    pub fn step(&self) -> bool {
        let Some(mut task) = self.inner.ready_queue.lock().pop_front() else {
            return false;
        };

        let poll = task.poll_with(|id| {
            Waker::from(Arc::new(TaskWaker {
                executor: Arc::downgrade(&self.inner),
                id,
            }))
        });

        match poll {
            Poll::Ready(()) => {
                tracing::trace!(task = %task.id, "task completed");
                self.inner.notified.lock().remove(&task.id);
            }
            Poll::Pending => {
                let mut waiting = self.inner.waiting.lock();
                if self.inner.notified.lock().remove(&task.id) {
                    // Woke itself during the poll
                    self.inner.ready_queue.lock().push_back(task);
                } else {
                    waiting.push(task);
                }
            }
        }
        true
    }

    /// Runs ready tasks until none are ready, including tasks woken along the way.
    ///
    /// This is the microtask drain: when it returns, every continuation that
    /// could make progress without time passing has run.
    ///
    /// Returns the number of polls performed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use asyncwait::executor::TestExecutor;
    ///
    /// let executor = TestExecutor::new();
    /// executor.spawn(async { 1 });
    /// executor.spawn(async { 2 });
    /// executor.spawn(async { 3 });
    ///
    /// assert_eq!(executor.run_until_stalled(), 3);
    /// assert!(executor.is_empty());
    /// ```
    pub fn run_until_stalled(&self) -> usize {
        let mut count = 0;
        while self.step() {
            count += 1;
        }
        count
    }
}

impl Default for TestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutor")
            .field("pending", &self.pending_count())
            .field("waiting", &self.waiting_count())
            .finish()
    }
}

/// Waker implementation that re-queues tasks.
///
/// Holds the executor weakly: tasks keep their waker, and the executor keeps
/// its tasks.
struct TaskWaker {
    executor: Weak<ExecutorInner>,
    id: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let Some(executor) = self.executor.upgrade() else {
            return;
        };
        let mut waiting = executor.waiting.lock();
        if let Some(pos) = waiting.iter().position(|t| t.id == self.id) {
            let task = waiting.remove(pos);
            executor.ready_queue.lock().push_back(task);
        } else {
            // Being polled right now, or already queued
            executor.notified.lock().insert(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::Context;

    /// Returns Pending once after waking itself.
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn test_new_executor_is_empty() {
        let executor = TestExecutor::new();
        assert!(executor.is_empty());
        assert_eq!(executor.pending_count(), 0);
        assert_eq!(executor.waiting_count(), 0);
    }

    #[test]
    fn test_step_runs_task() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(async { 42 });

        assert_eq!(executor.pending_count(), 1);
        assert!(executor.step());
        assert_eq!(handle.take(), Some(42));
        assert!(!executor.step());
    }

    #[test]
    fn test_self_wake_requeues() {
        let executor = TestExecutor::new();
        let handle = executor.spawn(async {
            YieldNow(false).await;
            "done"
        });

        assert_eq!(executor.run_until_stalled(), 2);
        assert_eq!(handle.take(), Some("done"));
    }

    #[test]
    fn test_fifo_order() {
        let executor = TestExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            executor.spawn(async move {
                order.lock().push(i);
                YieldNow(false).await;
                order.lock().push(i + 10);
            });
        }

        executor.run_until_stalled();
        assert_eq!(*order.lock(), vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_task_keeps_one_waker_across_polls() {
        let executor = TestExecutor::new();
        let seen = Arc::new(Mutex::new(Vec::<Waker>::new()));
        let seen2 = Arc::clone(&seen);

        executor.spawn(futures::future::poll_fn(move |cx| {
            let mut seen = seen2.lock();
            seen.push(cx.waker().clone());
            if seen.len() < 3 {
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        }));
        executor.run_until_stalled();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].will_wake(&seen[2]));
    }

    #[test]
    fn test_dropping_executor_drops_pending_tasks() {
        let executor = TestExecutor::new();
        let (tx, rx) = futures::channel::oneshot::channel::<u8>();
        let _handle = executor.spawn(async move { rx.await.ok() });
        executor.run_until_stalled();

        // the receiver went away with its task
        drop(executor);
        assert!(tx.send(1).is_err());
    }

    #[test]
    fn test_external_wake_moves_task_to_ready() {
        let executor = TestExecutor::new();
        let (tx, rx) = futures::channel::oneshot::channel::<u8>();
        let handle = executor.spawn(async move { rx.await.unwrap_or(0) });

        executor.run_until_stalled();
        assert_eq!(executor.waiting_count(), 1);

        tx.send(5).unwrap();
        assert_eq!(executor.pending_count(), 1);

        executor.run_until_stalled();
        assert_eq!(handle.take(), Some(5));
        assert!(executor.is_empty());
    }
}
