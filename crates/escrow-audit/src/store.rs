use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use escrow_types::{EscrowError, RiskEvent, User};

/// Storage seam for C12's accumulator: appends the event row and mutates the
/// subject's `risk_score`/`flagged_for_review` as one unit, the same
/// lock-mutate-persist shape as `escrow_wallet::WalletStore::apply`.
#[async_trait]
pub trait RiskStore: std::fmt::Debug + Send + Sync + 'static {
    /// Appends `event`, adds `event.weight` to the user's risk score, and
    /// sets `flagged_for_review` once the score reaches `threshold`.
    async fn apply_risk_event(&self, event: RiskEvent, threshold: i32) -> Result<User, EscrowError>;

    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError>;
    async fn events_for_user(&self, steam_id: u64) -> Result<Vec<RiskEvent>, EscrowError>;
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<u64, User>,
    events: Vec<RiskEvent>,
    next_event_id: i64,
}

/// In-memory fake for tests.
#[derive(Debug, Default)]
pub struct InMemoryRiskStore {
    inner: Mutex<Inner>,
}

impl InMemoryRiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: User) {
        self.inner.lock().unwrap().users.insert(user.steam_id, user);
    }
}

#[async_trait]
impl RiskStore for InMemoryRiskStore {
    async fn apply_risk_event(&self, mut event: RiskEvent, threshold: i32) -> Result<User, EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_event_id += 1;
        event.id = inner.next_event_id;

        let user = inner
            .users
            .get_mut(&event.user_steam_id)
            .ok_or_else(|| EscrowError::NotFound(format!("user {}", event.user_steam_id)))?;
        user.risk_score += event.weight;
        user.updated_at = event.created_at;
        if user.risk_score >= threshold {
            user.flagged_for_review = true;
        }
        let snapshot = user.clone();
        inner.events.push(event);
        Ok(snapshot)
    }

    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&steam_id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))
    }

    async fn events_for_user(&self, steam_id: u64) -> Result<Vec<RiskEvent>, EscrowError> {
        Ok(self.inner.lock().unwrap().events.iter().filter(|e| e.user_steam_id == steam_id).cloned().collect())
    }
}
