use std::time::Duration;

use escrow_kv::KvStore;
use uuid::Uuid;

/// Wraps `escrow_kv::KvStore::set_if_absent` in the `"{trade_uuid}:
/// {target_state}"` key scheme from spec.md §4.3, so a retried `attempt`
/// (after a crash between sending the Steam offer and recording it) reuses
/// the same offer id instead of sending a second one.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    kv: std::sync::Arc<dyn KvStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(kv: std::sync::Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(trade_id: Uuid, target_state: &str) -> String {
        format!("{trade_id}:{target_state}")
    }

    /// Returns the previously recorded value for `(trade_id, target_state)`
    /// if this step already ran, or `None` if the caller is free to perform
    /// the effect and must call [`Self::record`] with its result.
    pub async fn already_done(&self, trade_id: Uuid, target_state: &str) -> Option<String> {
        self.kv.get(&Self::key(trade_id, target_state)).await.ok().flatten()
    }

    /// Records `value` (typically a Steam offer id) for `(trade_id,
    /// target_state)`. Idempotent: a concurrent winner's value sticks; ours
    /// is discarded if we lost the race.
    pub async fn record(&self, trade_id: Uuid, target_state: &str, value: &str) {
        let _ = self.kv.set_if_absent(&Self::key(trade_id, target_state), value, self.ttl).await;
    }

    /// A one-shot claim: `true` only for the single caller that wins the
    /// race for `(trade_id, target_state)`. Unlike `already_done`/`record`
    /// (which have a check-then-act gap between them), this is one atomic
    /// `set_if_absent` call — the right tool for serializing a step with no
    /// natural at-most-once guard of its own, e.g. two concurrent `pay()`
    /// calls for the same trade (testable property 6, "no double capture").
    pub async fn try_claim(&self, trade_id: Uuid, target_state: &str) -> bool {
        self.kv.set_if_absent(&Self::key(trade_id, target_state), "1", self.ttl).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_kv::InMemoryKv;

    #[tokio::test]
    async fn records_and_recalls_the_winning_value() {
        let guard = IdempotencyGuard::new(std::sync::Arc::new(InMemoryKv::new()), Duration::from_secs(60));
        let trade_id = Uuid::new_v4();

        assert!(guard.already_done(trade_id, "awaiting_seller").await.is_none());
        guard.record(trade_id, "awaiting_seller", "offer-1").await;
        guard.record(trade_id, "awaiting_seller", "offer-2").await;

        assert_eq!(guard.already_done(trade_id, "awaiting_seller").await.unwrap(), "offer-1");
    }
}
