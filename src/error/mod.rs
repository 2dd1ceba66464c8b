//! Error definitions
//!
//! This module provides the error types surfaced by asyncwait.

use std::time::Duration;

use thiserror::Error;

/// Main error type for asyncwait
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Timeout error
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Fake timers kept firing past their loop limit
    #[error("Aborting after running {0} timers, assuming an infinite loop")]
    LoopLimit(usize),
}

impl Error {
    /// Returns `true` if this is a [`Error::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error observed by a waiter on a [`Deferred`](crate::deferred) value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeferredError<E> {
    /// The settler rejected the deferred.
    #[error("deferred was rejected: {0}")]
    Rejected(E),

    /// Every settler was dropped while the deferred was still pending.
    #[error("deferred was abandoned before it settled")]
    Abandoned,
}

impl<E> DeferredError<E> {
    /// Returns the rejection reason, if there is one.
    pub fn into_rejection(self) -> Option<E> {
        match self {
            Self::Rejected(err) => Some(err),
            Self::Abandoned => None,
        }
    }
}

/// A poll-until-satisfied run that ran out of time.
///
/// Produced by [`PollResult::into_result`](crate::poll::PollResult::into_result).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("condition not satisfied after {attempts} attempt(s) in {elapsed:?}")]
pub struct PollTimeout<E> {
    /// Number of times the check was invoked.
    pub attempts: u32,
    /// Time spent polling, measured on the injected clock.
    pub elapsed: Duration,
    /// The last failure returned by the check, if any attempt completed.
    pub last_error: Option<E>,
}
