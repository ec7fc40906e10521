//! Bounded rerun of whole transactions.

use std::future::Future;

use crate::error::AppError;

/// Run `attempt` until it succeeds, fails for good, or `max_attempts` runs
/// have all hit transient conflicts.
///
/// Each run must open its own transaction and read fresh state; the closure
/// receives the 1-based attempt number for logging.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, label: &str, mut attempt: F) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt = n, max_attempts, label, error = %e, "Transaction conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::RetriesExhausted {
        attempts: max_attempts,
    })
}
