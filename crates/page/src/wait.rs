//! Generic await-predicate-with-timeout utility.
//!
//! All the page-side condition waits (control discovery, modal
//! detection) go through this one polling loop so the timing behavior is
//! testable in isolation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Repeatedly run `probe` every `interval` until it yields a value or
/// `timeout` elapses. The probe always runs at least once, even with a
/// zero timeout. Returns None on deadline.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        let step = interval.min(deadline - now);
        tokio::time::sleep(step).await;
    }
}
