use async_trait::async_trait;
use escrow_types::BotSession;

use crate::errors::TradeError;
use crate::types::{AssetCollection, OfferState, Tradelink};

/// The six outbound Steam operations from spec.md §4.2, routed through the
/// rate limiter (C4) by every implementation. An async trait (rather than
/// the teacher's concrete `&SteamAuthenticator`-holding struct) so the trade
/// engine (C8) can depend on an interface and be driven in tests by
/// [`crate::mock::MockSteamClient`] instead of real Steam — there are no
/// inbound webhooks (spec.md §4.6), so tests must be able to inject offer
/// state transitions by hand.
#[async_trait]
pub trait SteamClient: std::fmt::Debug + Send + Sync {
    fn steam_id(&self) -> u64;

    async fn login(&self) -> Result<BotSession, TradeError>;
    async fn restore(&self, session: &BotSession) -> Result<(), TradeError>;

    async fn send_offer(
        &self,
        partner: Tradelink,
        my_items: AssetCollection,
        their_items: AssetCollection,
        message: Option<String>,
    ) -> Result<String, TradeError>;

    async fn accept_offer(&self, offer_id: &str) -> Result<(), TradeError>;
    async fn cancel_offer(&self, offer_id: &str) -> Result<(), TradeError>;
    async fn poll_offer(&self, offer_id: &str) -> Result<OfferState, TradeError>;

    async fn fetch_inventory(
        &self,
        owner_steam_id: u64,
        app_id: u32,
        context_id: &str,
    ) -> Result<AssetCollection, TradeError>;
}
