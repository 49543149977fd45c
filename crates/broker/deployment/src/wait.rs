//! Bounded, cancellable waits
//!
//! Every blocking remote operation in the engine runs through [`bounded`],
//! which races the operation against a deadline and the caller's
//! cancellation token. The operation receives a child token that is
//! cancelled on every exit path other than normal completion, so provider
//! clients can abandon in-flight work instead of leaking it.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a bounded wait did not produce a value
#[derive(Debug, PartialEq, Eq)]
pub enum WaitError<E> {
    /// The deadline passed first
    TimedOut(Duration),

    /// The caller's token fired first
    Cancelled,

    /// The operation itself failed
    Failed(E),
}

/// Run `operation` until it completes, `timeout` elapses or `cancel` fires
pub async fn bounded<T, E, F, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, WaitError<E>>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let op_token = cancel.child_token();
    // Dropping the guard cancels the child token; the timer is dropped with the select.
    let guard = op_token.clone().drop_guard();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WaitError::Cancelled),
        outcome = operation(op_token) => outcome.map_err(WaitError::Failed),
        _ = tokio::time::sleep(timeout) => Err(WaitError::TimedOut(timeout)),
    };

    if result.is_ok() {
        guard.disarm();
    }
    result
}
