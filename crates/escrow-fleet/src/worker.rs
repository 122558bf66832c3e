use std::sync::Arc;

use escrow_types::{Bot, BotSecrets, BotStatus};
use steam_trading::SteamClient;
use tokio::sync::RwLock;

/// One bot account: its row (under an `RwLock` so `acquire`/`release` can
/// read-modify-write status and load), the secrets needed to re-login, and
/// the [`SteamClient`] it trades through.
#[derive(Debug)]
pub struct BotWorker {
    pub(crate) state: RwLock<Bot>,
    pub(crate) secrets: BotSecrets,
    pub(crate) client: Arc<dyn SteamClient>,
}

impl BotWorker {
    pub fn new(state: Bot, secrets: BotSecrets, client: Arc<dyn SteamClient>) -> Arc<Self> {
        Arc::new(Self { state: RwLock::new(state), secrets, client })
    }

    pub fn steam_id(&self) -> u64 {
        self.client.steam_id()
    }

    pub fn account_name(&self) -> &str {
        &self.secrets.account_name
    }

    pub fn client(&self) -> Arc<dyn SteamClient> {
        self.client.clone()
    }

    pub async fn status(&self) -> BotStatus {
        self.state.read().await.status
    }

    pub async fn load(&self) -> i32 {
        self.state.read().await.active_trade_count
    }

    pub async fn snapshot(&self) -> Bot {
        self.state.read().await.clone()
    }

    pub(crate) async fn transition(&self, target: BotStatus) -> bool {
        let mut state = self.state.write().await;
        if !state.status.can_transition_to(target) {
            return false;
        }
        state.status = target;
        state.updated_at = chrono::Utc::now();
        true
    }

    pub(crate) async fn set_last_error(&self, error: String) {
        let mut state = self.state.write().await;
        state.last_error = Some(error);
        state.updated_at = chrono::Utc::now();
    }

    pub(crate) async fn incr_load(&self) {
        let mut state = self.state.write().await;
        state.active_trade_count += 1;
        state.updated_at = chrono::Utc::now();
    }

    pub(crate) async fn decr_load(&self) {
        let mut state = self.state.write().await;
        state.active_trade_count = (state.active_trade_count - 1).max(0);
        state.updated_at = chrono::Utc::now();
    }
}
