//! C4: the global token-bucket rate limiter guarding outbound Steam calls.
//!
//! Contract (spec.md §4.1): `acquire()` waits until a slot is free and never
//! fails open unless the KV store itself is unavailable, in which case it
//! waits a bounded grace period and proceeds rather than deadlocking the
//! worker pool.

#![deny(missing_debug_implementations, unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use escrow_kv::KvStore;
use tracing::warn;

/// Grace period the limiter waits before proceeding when the KV store is
/// unavailable (spec.md §4.1).
const KV_UNAVAILABLE_GRACE: Duration = Duration::from_secs(5);

/// How long the limiter sleeps between polls while a window is saturated.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Token bucket scoped by an arbitrary key (`"global"`, or a bot's steam id
/// for a per-bot override) so one `RateLimiter` can gate both the global
/// ceiling and tighter per-bot ceilings.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { kv, config }
    }

    /// Blocks until a call slot is available under `scope` (e.g. `"global"`
    /// or `"bot:<steamid>"`), then returns. Never returns an error: on
    /// repeated KV failure it degrades to "wait and proceed" rather than
    /// stall the caller indefinitely (spec.md §4.1).
    pub async fn acquire(&self, scope: &str) {
        loop {
            let key = self.window_key(scope);
            match self.kv.incr_with_ttl(&key, self.config.window * 2).await {
                Ok(count) if count <= self.config.capacity as u64 => return,
                Ok(_) => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(err) => {
                    warn!(error = %err, scope, "rate limiter KV unavailable, waiting grace period and proceeding");
                    tokio::time::sleep(KV_UNAVAILABLE_GRACE).await;
                    return;
                }
            }
        }
    }

    fn window_key(&self, scope: &str) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let window_index = now.as_secs() / self.config.window.as_secs().max(1);
        format!("steam:ratelimit:{scope}:{window_index}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_kv::InMemoryKv;

    #[tokio::test]
    async fn allows_calls_up_to_capacity_without_waiting() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryKv::new()),
            RateLimitConfig {
                capacity: 3,
                window: Duration::from_secs(60),
            },
        );

        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire("global").await;
        }
        assert!(start.elapsed() < Duration::from_millis(200), "first `capacity` calls must not block");
    }

    /// S5 (spec.md §8), scaled to a window short enough to run in real time:
    /// more concurrent callers than `capacity` within one window. All of them
    /// eventually complete (the limiter never fails open or deadlocks), but
    /// not within the first poll interval — proof that the overflow callers
    /// were actually deferred rather than let through.
    #[tokio::test]
    async fn saturation_defers_calls_past_capacity_without_failing_open() {
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryKv::new()),
            RateLimitConfig {
                capacity: 5,
                window: Duration::from_secs(1),
            },
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire("global").await }));
        }

        // Within one poll interval, at most `capacity` can plausibly have
        // gone through; the rest are still parked in their retry loop.
        tokio::time::sleep(POLL_INTERVAL / 2).await;
        let finished_early = handles.iter().filter(|h| h.is_finished()).count();
        assert!(finished_early <= 5, "more than capacity callers returned before the first poll interval elapsed");

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(3), handle).await.expect("acquire must eventually complete, never deadlock").unwrap();
        }
    }
}
