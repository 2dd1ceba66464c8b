//! # asyncwait
//!
//! > Deferred values and condition polling for async tests
//!
//! **asyncwait** replaces "sleep and hope" in async tests with two tools:
//!
//! - [`deferred`](deferred::deferred) - a settle-once value whose read side
//!   can be awaited and whose write side can be handed to a callback
//! - [`poll_until`](poll::poll_until) - retry a check with exponential
//!   backoff until it succeeds or a time budget runs out
//!
//! Both work against an injected [`TimeSource`](clock::TimeSource), so the same
//! test code runs on real time ([`TokioClock`](clock::TokioClock)) or on
//! [`FakeTimers`](timers::FakeTimers), where advancing virtual time also runs
//! every task the timers woke.
//!
//! ## Quick Start
//!
//! ```rust
//! use asyncwait::prelude::*;
//! use std::future::ready;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let timers = FakeTimers::new();
//! let up = Arc::new(AtomicBool::new(false));
//!
//! let flag = Arc::clone(&up);
//! let _ = timers.set_timeout(Duration::from_millis(250), move || {
//!     flag.store(true, Ordering::SeqCst);
//! });
//!
//! let clock = timers.clock().clone();
//! let handle = timers.spawn(async move {
//!     poll_until(&clock, &PollConfig::new(), || {
//!         ready(if up.load(Ordering::SeqCst) { Ok(()) } else { Err("down") })
//!     })
//!     .await
//! });
//!
//! timers.advance(Duration::from_secs(1));
//! let result = handle.take().unwrap();
//! assert!(result.is_satisfied());
//! assert_eq!(result.elapsed(), Duration::from_millis(300));
//! ```
//!
//! ## Features
//!
//! - `tokio` (default) - [`TokioClock`](clock::TokioClock), a time source
//!   backed by `tokio::time`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Time sources for real and virtual time
pub mod clock;

pub mod assertions;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod mock;
pub mod poll;
pub mod timers;

/// Prelude for convenient imports
///
/// ```rust
/// use asyncwait::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::deferred::{deferred, Awaitable, DeferredState, Settler};
    pub use crate::error::{DeferredError, Error, PollTimeout, Result};
    pub use crate::executor::{TaskHandle, TestExecutor};
    pub use crate::mock::CallTracker;
    pub use crate::poll::{poll_until, PollConfig, PollResult, Poller};
    pub use crate::timers::{FakeTimers, TimersConfig};
    pub use std::time::Duration;
}

pub use error::{Error, Result};
