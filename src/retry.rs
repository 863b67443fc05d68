//! Retry decorator for flaky RPC calls
//!
//! Runs an async operation up to a fixed number of attempts with
//! exponential backoff between failures. The final error is returned
//! unmodified so callers can still inspect the original failure.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Run `op` with retries and exponential backoff.
///
/// The delay before attempt `n+1` is `initial_delay * 2^(n-1)`, so with an
/// initial delay of 1s the waits are 1s, 2s, 4s, ... Backoff uses the
/// tokio clock, so tests can drive it deterministically with a paused
/// runtime clock.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(max_attempts >= 1);
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                warn!(
                    "{} failed after {} attempts, giving up: {}",
                    label, attempt, err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = initial_delay * 2u32.saturating_pow(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_first_attempt_success_does_not_sleep() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 3, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_attempts_exactly_max_times() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("op", 3, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The original error comes back unwrapped.
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_between_attempts() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let _: Result<()> = with_retry("op", 3, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        })
        .await;
        // 1s after attempt 1, 2s after attempt 2.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 3, Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("transient")
                }
                Ok("ok")
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
