//! Controlled async task execution
//!
//! This module provides a [`TestExecutor`] for deterministic async testing.
//! Unlike production executors (tokio, async-std), the `TestExecutor` gives
//! you complete control over when tasks execute, and always resumes them in
//! the order they were woken.
//!
//! # Example
//!
//! ```rust
//! use asyncwait::executor::TestExecutor;
//!
//! let executor = TestExecutor::new();
//!
//! // Spawn tasks - they don't run automatically
//! let handle1 = executor.spawn(async { 1 + 1 });
//! let handle2 = executor.spawn(async { 2 + 2 });
//! assert_eq!(executor.pending_count(), 2);
//!
//! executor.run_until_stalled();
//! assert_eq!(handle1.take(), Some(2));
//! assert_eq!(handle2.take(), Some(4));
//! ```

mod task;
mod test_executor;

pub use task::{TaskHandle, TaskId};
pub use test_executor::TestExecutor;
