use std::sync::Arc;

use async_trait::async_trait;
use escrow_ratelimit::RateLimiter;
use escrow_types::BotSession;
use reqwest::Method;
use serde::Deserialize;
use steam_mobile::{ConfirmationMethod, SteamAuthenticator, STEAM_COMMUNITY_HOST};
use tracing::debug;

use crate::client::SteamClient;
use crate::errors::{OfferError, TradeError};
use crate::retry::with_retry;
use crate::types::{Asset, AssetCollection, OfferState, TradeOffer, Tradelink};

const TRADEOFFER_BASE: &str = "https://steamcommunity.com/tradeoffer/";

/// Production [`SteamClient`], generalizing the teacher's
/// `SteamTradeManager` (`steam-trading::lib`) from a single always-on
/// account into one instance per logged-in bot, holding that bot's
/// [`SteamAuthenticator`] and sharing the process-wide [`RateLimiter`].
#[derive(Debug)]
pub struct SteamTradeClient {
    authenticator: Arc<SteamAuthenticator>,
    rate_limiter: Arc<RateLimiter>,
}

impl SteamTradeClient {
    pub fn new(authenticator: Arc<SteamAuthenticator>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            authenticator,
            rate_limiter,
        }
    }

    fn scope(&self) -> String {
        format!("bot:{}", self.authenticator.steam_id())
    }

    async fn gated<F, Fut, T>(&self, op: F) -> Result<T, TradeError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, TradeError>>,
    {
        self.rate_limiter.acquire(&self.scope()).await;
        with_retry(op).await
    }
}

#[async_trait]
impl SteamClient for SteamTradeClient {
    fn steam_id(&self) -> u64 {
        self.authenticator.steam_id()
    }

    async fn login(&self) -> Result<BotSession, TradeError> {
        self.rate_limiter.acquire(&self.scope()).await;
        Ok(self.authenticator.login().await?)
    }

    async fn restore(&self, session: &BotSession) -> Result<(), TradeError> {
        Ok(self.authenticator.restore(session)?)
    }

    async fn send_offer(
        &self,
        partner: Tradelink,
        my_items: AssetCollection,
        their_items: AssetCollection,
        message: Option<String>,
    ) -> Result<String, TradeError> {
        TradeOffer::validate(&my_items, &their_items)?;

        self.gated(|| async {
            let response = self
                .authenticator
                .http_client()
                .request(Method::POST, format!("{TRADEOFFER_BASE}new/send"))
                .header("Referer", format!("{TRADEOFFER_BASE}new"))
                .json(&serde_json::json!({
                    "partner": partner.partner_steam_id,
                    "trade_offer_access_token": partner.token,
                    "my_items": my_items.0,
                    "their_items": their_items.0,
                    "message": message,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(TradeError::from_status(response.status(), response.text().await.unwrap_or_default()));
            }

            #[derive(Deserialize)]
            struct CreateResponse {
                tradeofferid: String,
            }
            let parsed: CreateResponse = response.json().await?;
            Ok(parsed.tradeofferid)
        })
        .await
    }

    async fn accept_offer(&self, offer_id: &str) -> Result<(), TradeError> {
        self.gated(|| async {
            let response = self
                .authenticator
                .http_client()
                .post(format!("{TRADEOFFER_BASE}{offer_id}/accept"))
                .header("Referer", format!("{TRADEOFFER_BASE}{offer_id}/"))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(TradeError::from_status(response.status(), response.text().await.unwrap_or_default()));
            }
            Ok(())
        })
        .await?;

        let confirmations = self
            .authenticator
            .fetch_confirmations_for_offer(offer_id.parse().map_err(|_| OfferError::NoMatch)?)
            .await
            .ok();

        if let Some(confirmations) = confirmations {
            debug!(offer_id, count = confirmations.len(), "confirming accepted offer via mobile authenticator");
            self.authenticator
                .process_confirmations(ConfirmationMethod::Accept, confirmations)
                .await?;
        }

        Ok(())
    }

    async fn cancel_offer(&self, offer_id: &str) -> Result<(), TradeError> {
        self.gated(|| async {
            let response = self
                .authenticator
                .http_client()
                .post(format!("{TRADEOFFER_BASE}{offer_id}/cancel"))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(TradeError::from_status(response.status(), response.text().await.unwrap_or_default()));
            }
            Ok(())
        })
        .await
    }

    async fn poll_offer(&self, offer_id: &str) -> Result<OfferState, TradeError> {
        self.gated(|| async {
            let response = self
                .authenticator
                .http_client()
                .get(format!("{STEAM_COMMUNITY_HOST}/tradeoffer/{offer_id}/"))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(TradeError::from_status(response.status(), response.text().await.unwrap_or_default()));
            }

            #[derive(Deserialize)]
            struct PollResponse {
                state: OfferState,
            }
            let parsed: PollResponse = response.json().await?;
            Ok(parsed.state)
        })
        .await
    }

    async fn fetch_inventory(
        &self,
        owner_steam_id: u64,
        app_id: u32,
        context_id: &str,
    ) -> Result<AssetCollection, TradeError> {
        self.gated(|| async {
            let response = self
                .authenticator
                .http_client()
                .get(format!("{STEAM_COMMUNITY_HOST}/inventory/{owner_steam_id}/{app_id}/{context_id}"))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(TradeError::from_status(response.status(), response.text().await.unwrap_or_default()));
            }

            #[derive(Deserialize)]
            struct InventoryResponse {
                assets: Vec<Asset>,
            }
            let parsed: InventoryResponse = response.json().await?;
            Ok(AssetCollection(parsed.assets))
        })
        .await
    }
}
