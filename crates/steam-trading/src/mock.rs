//! A hand-driven [`SteamClient`] double, standing in for the fact that
//! spec.md §4.6 gives this system no inbound webhooks: the only way tests
//! can simulate Steam's ground truth changing is to poke it directly, which
//! is exactly what this mock exposes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use escrow_types::BotSession;

use crate::client::SteamClient;
use crate::errors::TradeError;
use crate::types::{AssetCollection, OfferState, Tradelink};

#[derive(Debug, Default)]
struct MockState {
    next_offer_id: u64,
    offers: HashMap<String, OfferState>,
    sent_offers: Vec<(String, Tradelink)>,
    inventories: HashMap<(u64, u32), AssetCollection>,
}

#[derive(Debug, Default)]
pub struct MockSteamClient {
    steam_id: u64,
    state: Mutex<MockState>,
}

impl MockSteamClient {
    pub fn new(steam_id: u64) -> Self {
        Self {
            steam_id,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn seed_inventory(&self, owner: u64, app_id: u32, items: AssetCollection) {
        self.state.lock().unwrap().inventories.insert((owner, app_id), items);
    }

    /// Test-only hook simulating Steam's side of an offer resolving.
    pub fn resolve_offer(&self, offer_id: &str, state: OfferState) {
        self.state.lock().unwrap().offers.insert(offer_id.to_string(), state);
    }

    pub fn sent_offer_count(&self) -> usize {
        self.state.lock().unwrap().sent_offers.len()
    }
}

#[async_trait]
impl SteamClient for MockSteamClient {
    fn steam_id(&self) -> u64 {
        self.steam_id
    }

    async fn login(&self) -> Result<BotSession, TradeError> {
        Ok(BotSession {
            steam_id: self.steam_id,
            cookies: vec!["sessionid=mock".into()],
            session_id: "mock".into(),
            saved_at: Utc::now(),
        })
    }

    async fn restore(&self, _session: &BotSession) -> Result<(), TradeError> {
        Ok(())
    }

    async fn send_offer(
        &self,
        partner: Tradelink,
        _my_items: AssetCollection,
        _their_items: AssetCollection,
        _message: Option<String>,
    ) -> Result<String, TradeError> {
        let mut state = self.state.lock().unwrap();
        state.next_offer_id += 1;
        let offer_id = state.next_offer_id.to_string();
        state.offers.insert(offer_id.clone(), OfferState::Active);
        state.sent_offers.push((offer_id.clone(), partner));
        Ok(offer_id)
    }

    async fn accept_offer(&self, offer_id: &str) -> Result<(), TradeError> {
        self.state.lock().unwrap().offers.insert(offer_id.to_string(), OfferState::Accepted);
        Ok(())
    }

    async fn cancel_offer(&self, offer_id: &str) -> Result<(), TradeError> {
        self.state.lock().unwrap().offers.insert(offer_id.to_string(), OfferState::Cancelled);
        Ok(())
    }

    async fn poll_offer(&self, offer_id: &str) -> Result<OfferState, TradeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .offers
            .get(offer_id)
            .copied()
            .unwrap_or(OfferState::Invalid))
    }

    async fn fetch_inventory(
        &self,
        owner_steam_id: u64,
        app_id: u32,
        _context_id: &str,
    ) -> Result<AssetCollection, TradeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .inventories
            .get(&(owner_steam_id, app_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_resolve_offer() {
        let client = MockSteamClient::new(1);
        let offer_id = client
            .send_offer(
                Tradelink {
                    partner_steam_id: 2,
                    token: Some("tok".into()),
                },
                AssetCollection::default(),
                AssetCollection::default(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(client.poll_offer(&offer_id).await.unwrap(), OfferState::Active);
        client.resolve_offer(&offer_id, OfferState::Accepted);
        assert_eq!(client.poll_offer(&offer_id).await.unwrap(), OfferState::Accepted);
        assert_eq!(client.sent_offer_count(), 1);
    }
}
