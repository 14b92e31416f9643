//! Poll-with-deadline

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Evaluate `predicate` every `interval` until it returns true or `max_wait`
/// has elapsed. Returns whether the predicate was satisfied. The predicate
/// is always evaluated at least once; its errors end the wait.
pub async fn poll_until<F, Fut>(interval: Duration, max_wait: Duration, mut predicate: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + max_wait;
    loop {
        if predicate().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
