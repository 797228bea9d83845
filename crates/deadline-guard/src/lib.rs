//! Bounded waits for async operations.
//!
//! Every remote call in the session subsystem is a suspension point with no
//! intrinsic upper bound. [`with_deadline`] races an operation against a
//! timer; if the timer fires first the operation is dropped and the caller
//! gets [`DeadlineOutcome::TimedOut`] instead of hanging forever.
//!
//! A result that would have arrived after the deadline is discarded by
//! construction (the future is dropped), so callers can never apply a stale
//! result to shared state.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Result of racing an operation against a deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineOutcome<T> {
    /// The operation finished before the deadline.
    Completed(T),
    /// The deadline fired first; the operation was dropped.
    TimedOut,
}

impl<T> DeadlineOutcome<T> {
    /// Returns true if the deadline fired before the operation finished.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, DeadlineOutcome::TimedOut)
    }

    /// Unwraps the completed value, or `None` on timeout.
    pub fn completed(self) -> Option<T> {
        match self {
            DeadlineOutcome::Completed(value) => Some(value),
            DeadlineOutcome::TimedOut => None,
        }
    }

    /// Maps the completed value, preserving a timeout.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> DeadlineOutcome<U> {
        match self {
            DeadlineOutcome::Completed(value) => DeadlineOutcome::Completed(f(value)),
            DeadlineOutcome::TimedOut => DeadlineOutcome::TimedOut,
        }
    }
}

/// Runs `operation` with an upper bound of `deadline`.
///
/// On expiry the operation future is dropped, which also cancels any
/// in-flight I/O it owns. The `label` is included in the timeout log line so
/// dashboards can tell which remote call is slow.
pub async fn with_deadline<F>(operation: F, deadline: Duration, label: &str) -> DeadlineOutcome<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(value) => DeadlineOutcome::Completed(value),
        Err(_) => {
            debug!(label = %label, deadline_ms = deadline.as_millis() as u64, "operation exceeded deadline");
            DeadlineOutcome::TimedOut
        }
    }
}
