//! Time sources for async tests
//!
//! The `clock` module provides the [`TimeSource`] capability that every
//! timer-driven component in this crate takes as a parameter, and two
//! implementations of it:
//!
//! - [`MockClock`], a virtual clock that only moves when the test advances it
//! - [`TokioClock`] (feature `tokio`), backed by `tokio::time`
//!
//! # Example
//!
//! ```rust
//! use asyncwait::clock::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! assert_eq!(clock.now(), Duration::ZERO);
//!
//! clock.advance(Duration::from_secs(10));
//! assert_eq!(clock.now(), Duration::from_secs(10));
//! ```

mod mock_clock;
mod sleep;
mod source;
mod timeout;
#[cfg(feature = "tokio")]
mod tokio;

pub use mock_clock::MockClock;
pub use sleep::MockSleep;
pub use source::{BoxSleep, TimeSource};
pub use timeout::{timeout, Timeout};
#[cfg(feature = "tokio")]
pub use self::tokio::TokioClock;
