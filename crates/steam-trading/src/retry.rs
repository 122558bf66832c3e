//! Exponential backoff with jitter, base 2s, max 30s, max 3 attempts
//! (spec.md §4.2), reusing the `backoff` crate the teacher already depends
//! on in `steam-mobile`.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::errors::TradeError;

const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;

fn backoff_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: BASE_DELAY,
        max_interval: MAX_DELAY,
        max_elapsed_time: Some(MAX_DELAY * MAX_ATTEMPTS),
        ..ExponentialBackoff::default()
    }
}

/// Runs `operation`, retrying transient [`TradeError`]s with exponential
/// backoff up to [`MAX_ATTEMPTS`], per the retry predicate in §4.2/§7: only
/// `TradeError::Transient`/`Network` are retried; everything else surfaces
/// immediately.
pub async fn with_retry<F, Fut, T>(mut operation: F) -> Result<T, TradeError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TradeError>>,
{
    let mut policy = backoff_policy();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < MAX_ATTEMPTS => {
                let delay = policy.next_backoff().unwrap_or(MAX_DELAY);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying transient steam error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TradeError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TradeError::Transient("connection reset".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_persistent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TradeError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TradeError::Persistent("invalid trade url".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let result = with_retry(|| async { Ok::<_, TradeError>(42) }).await.unwrap();
        assert_eq!(result, 42);
    }
}
