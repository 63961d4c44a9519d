//! Bounded retry executor shared by publisher construction and topic
//! provisioning.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Outcome of a single retryable attempt.
pub enum Attempt<E> {
    /// The operation succeeded; stop retrying.
    Done,
    /// A transient failure, expected to resolve itself; try again.
    Retry,
    /// A terminal failure; propagate unchanged and bypass remaining attempts.
    Abort(E),
}

#[derive(Debug, Error, PartialEq)]
pub enum RetryError<E> {
    /// The retry budget was consumed without success.
    #[error("retry budget exhausted")]
    Exhausted,

    #[error("operation aborted: {0}")]
    Aborted(E),
}

/// Invoke `op` up to `max_attempts` times, sleeping a capped linear backoff
/// between attempts. Stops immediately on [`Attempt::Done`] or
/// [`Attempt::Abort`].
pub async fn retry_bounded<F, Fut, E>(
    max_attempts: u32,
    base_backoff: Duration,
    mut op: F,
) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<E>>,
{
    for attempt in 0..max_attempts {
        match op().await {
            Attempt::Done => return Ok(()),
            Attempt::Abort(err) => return Err(RetryError::Aborted(err)),
            Attempt::Retry => {
                if attempt + 1 < max_attempts {
                    sleep(backoff_for(attempt, base_backoff)).await;
                }
            }
        }
    }
    Err(RetryError::Exhausted)
}

/// Linear backoff: base * (attempt + 1), capped.
fn backoff_for(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt + 1).min(MAX_BACKOFF)
}
