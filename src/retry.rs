//! Deadline-bounded polling with minor/severe error classification.
//!
//! An operation is retried on a fixed interval until it reports completion,
//! fails severely, or the deadline passes. Minor errors are remembered so
//! that a loop cut short by its deadline reports the last thing that went
//! wrong instead of a bare timeout.
//!
//! # Example
//!
//! ```ignore
//! use shoot_care::retry::{until_timeout, Outcome};
//!
//! until_timeout(Duration::from_secs(60), Duration::from_secs(5), || async {
//!     match check().await {
//!         Ok(true) => Outcome::Done(()),
//!         Ok(false) => Outcome::NotDone,
//!         Err(e) if e.is_retryable() => Outcome::Minor(e),
//!         Err(e) => Outcome::Severe(e),
//!     }
//! })
//! .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Error;

/// Default interval between two polling attempts
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Result of a single polling attempt.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// The awaited state has been reached
    Done(T),
    /// Not there yet, nothing went wrong
    NotDone,
    /// Recoverable failure, try again after the interval
    Minor(E),
    /// Fatal failure, stop polling immediately
    Severe(E),
}

/// Reason a polling loop gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// An attempt failed severely
    Severe(E),
    /// The deadline passed; carries the last minor error, if any was seen
    Timeout { last: Option<E> },
}

impl<E> RetryError<E> {
    /// Whether the loop ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout { .. })
    }

    /// The underlying error, if one was observed
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Severe(e) => Some(e),
            RetryError::Timeout { last } => last,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Severe(e) => write!(f, "{e}"),
            RetryError::Timeout { last: Some(e) } => {
                write!(f, "retry failed with deadline exceeded, last error: {e}")
            }
            RetryError::Timeout { last: None } => write!(f, "retry failed with deadline exceeded"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Severe(e) | RetryError::Timeout { last: Some(e) } => Some(e),
            RetryError::Timeout { last: None } => None,
        }
    }
}

impl From<RetryError<Error>> for Error {
    fn from(err: RetryError<Error>) -> Self {
        match err {
            RetryError::Severe(e) | RetryError::Timeout { last: Some(e) } => e,
            RetryError::Timeout { last: None } => {
                Error::Timeout("deadline exceeded before the operation completed".to_string())
            }
        }
    }
}

/// Poll `operation` every `interval` until it is done, fails severely, or
/// `deadline` passes.
///
/// Every attempt is itself bounded by the deadline, so a hanging call cannot
/// outlive the caller's budget.
pub async fn until<T, E, F, Fut>(
    deadline: Instant,
    interval: Duration,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
    E: fmt::Display,
{
    let mut last_minor: Option<E> = None;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match tokio::time::timeout_at(deadline, operation()).await {
            Err(_) => return Err(RetryError::Timeout { last: last_minor }),
            Ok(Outcome::Done(value)) => return Ok(value),
            Ok(Outcome::Severe(e)) => return Err(RetryError::Severe(e)),
            Ok(Outcome::Minor(e)) => {
                debug!(attempt, error = %e, "Polling attempt failed, retrying");
                last_minor = Some(e);
            }
            Ok(Outcome::NotDone) => {
                trace!(attempt, "Polling condition not yet met");
            }
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(RetryError::Timeout { last: last_minor });
        }
        tokio::time::sleep_until(next).await;
    }
}

/// [`until`] with a deadline `timeout` from now.
pub async fn until_timeout<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
    E: fmt::Display,
{
    until(Instant::now() + timeout, interval, operation).await
}

/// Deadline for a nested retry that may use `share` (0.0 to 1.0) of the
/// time left before `deadline`.
pub fn split_deadline(deadline: Instant, share: f64) -> Instant {
    let now = Instant::now();
    let remaining = deadline.saturating_duration_since(now);
    now + remaining.mul_f64(share.clamp(0.0, 1.0))
}
