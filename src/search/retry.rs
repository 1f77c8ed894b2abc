//! Bounded retry for calls to hosted collaborators.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// Run `op` up to `1 + max_retries` times, doubling the delay between
/// attempts. Only transient errors (connection, timeout) are retried;
/// anything else returns immediately.
pub async fn with_retry<T, F, Fut>(max_retries: u32, backoff_ms: u64, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = backoff_ms;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && err.is_transient() => {
                attempt += 1;
                warn!(attempt, error = %err, "transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
