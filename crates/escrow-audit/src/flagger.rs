use std::sync::Arc;

use chrono::Utc;
use escrow_types::{EscrowError, RiskEvent, RiskEventKind, User};
use tracing::warn;
use uuid::Uuid;

use crate::store::RiskStore;

/// C12: accumulates a per-user risk score from observed events (API key
/// changed, item missing, rapid cancellations, ownership check failed) and
/// flags the user for manual review once the configured threshold is
/// crossed (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct FraudFlagger {
    store: Arc<dyn RiskStore>,
    review_threshold: i32,
}

impl FraudFlagger {
    pub fn new(store: Arc<dyn RiskStore>, review_threshold: i32) -> Self {
        Self { store, review_threshold }
    }

    /// Records one observed event against `user_steam_id`, using the kind's
    /// default weight (overridable via `weight_override`, e.g. repeated
    /// offenses of the same kind escalating faster).
    pub async fn record(
        &self,
        user_steam_id: u64,
        kind: RiskEventKind,
        trade_id: Option<Uuid>,
        weight_override: Option<i32>,
    ) -> Result<User, EscrowError> {
        let weight = weight_override.unwrap_or_else(|| kind.default_weight());
        let event = RiskEvent {
            id: 0, // assigned by the store
            user_steam_id,
            kind,
            weight,
            trade_id,
            created_at: Utc::now(),
        };
        let user = self.store.apply_risk_event(event, self.review_threshold).await?;
        if user.flagged_for_review {
            warn!(steam_id = user_steam_id, risk_score = user.risk_score, "user flagged for manual review");
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRiskStore;
    use chrono::Utc;

    fn user(steam_id: u64) -> User {
        User {
            steam_id,
            display_name: "u".into(),
            avatar_url: None,
            delivery_trade_url: None,
            balance: Default::default(),
            reserved: Default::default(),
            risk_score: 0,
            flagged_for_review: false,
            banned: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn accumulates_weight_and_flags_at_threshold() {
        let store = Arc::new(InMemoryRiskStore::new());
        store.seed_user(user(1));
        let flagger = FraudFlagger::new(store, 50);

        flagger.record(1, RiskEventKind::ApiKeyChanged, None, None).await.unwrap(); // 20
        let after = flagger.record(1, RiskEventKind::ItemMissing, None, None).await.unwrap(); // +40 = 60

        assert_eq!(after.risk_score, 60);
        assert!(after.flagged_for_review);
    }

    #[tokio::test]
    async fn below_threshold_does_not_flag() {
        let store = Arc::new(InMemoryRiskStore::new());
        store.seed_user(user(1));
        let flagger = FraudFlagger::new(store, 50);

        let after = flagger.record(1, RiskEventKind::RapidCancellations, None, None).await.unwrap();
        assert_eq!(after.risk_score, 15);
        assert!(!after.flagged_for_review);
    }
}
