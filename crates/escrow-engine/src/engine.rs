use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use escrow_audit::FraudFlagger;
use escrow_fleet::FleetManager;
use escrow_notify::Notifier;
use escrow_types::{
    Actor, DisputeOutcome, EscrowError, ItemSnapshot, ListingKind, ListingStatus, NotificationKind, Pricing,
    RiskEventKind, Trade, TradeStatus,
};
use escrow_wallet::WalletLedger;
use rust_decimal::Decimal;
use steam_trading::{AssetCollection, OfferState, SteamClient, TradeError, Tradelink};
use tracing::{info, warn};
use uuid::Uuid;

use crate::idempotency::IdempotencyGuard;
use crate::listing_store::ListingStore;
use crate::trade_store::TradeStore;

/// Bounds how many states a single [`TradeEngine::advance`] call will walk
/// through before yielding back to the caller (scheduler/reconciler tick or
/// an explicit `pay`). Prevents a logic bug in the transition graph from
/// spinning forever; 13 is one more than the number of distinct states.
const MAX_CASCADE_STEPS: usize = 13;

/// Sentinel left in `Trade::notes` when a buyer-leg failure is permanent
/// (item unrecoverable): `awaiting_buyer` has no direct edge to `refunded`
/// in spec.md §4.3's table, so the engine routes through `error_forwarding`
/// and uses this marker to skip straight to `refunded` on the next step
/// instead of attempting a pointless resend.
const PERMANENT_FORWARDING_FAILURE: &str = "__permanent_forwarding_failure__";

fn classify(err: TradeError) -> EscrowError {
    if err.is_retriable() {
        EscrowError::Transient(err.to_string())
    } else {
        EscrowError::Persistent(err.to_string())
    }
}

/// Extracts the `token` query parameter from a Steam trade url. Partner id
/// is taken from the domain model directly (`Trade::seller_steam_id`)
/// rather than the url's 32-bit accountid, since the engine already knows
/// the full 64-bit id.
fn trade_url_token(url: &str) -> Option<String> {
    let query = url.split('?').nth(1)?;
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        (key == "token").then(|| value.to_string())
    })
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub trade_timeout: Duration,
    pub await_leg_timeout: Duration,
    pub max_retries: i32,
    pub fee_percent: Decimal,
}

/// C8: the trade state machine. Owns no I/O of its own beyond the seams it
/// is handed — [`TradeStore`]/[`ListingStore`] for persistence, a
/// [`steam_trading::SteamClient`] borrowed from the fleet per-trade, and the
/// wallet/notifier/fraud facades from their own crates — so the whole engine
/// can be driven against in-memory fakes in tests (per `InMemoryTradeStore`
/// et al.) with no network or database involved.
#[derive(Debug, Clone)]
pub struct TradeEngine {
    trades: Arc<dyn TradeStore>,
    listings: Arc<dyn ListingStore>,
    wallet: WalletLedger,
    fleet: Arc<FleetManager>,
    notifier: Arc<Notifier>,
    flagger: Arc<FraudFlagger>,
    idempotency: IdempotencyGuard,
    config: EngineConfig,
}

impl TradeEngine {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        listings: Arc<dyn ListingStore>,
        wallet: WalletLedger,
        fleet: Arc<FleetManager>,
        notifier: Arc<Notifier>,
        flagger: Arc<FraudFlagger>,
        idempotency: IdempotencyGuard,
        config: EngineConfig,
    ) -> Self {
        Self { trades, listings, wallet, fleet, notifier, flagger, idempotency, config }
    }

    pub async fn get(&self, trade_id: Uuid) -> Result<Trade, EscrowError> {
        self.trades.get(trade_id).await
    }

    /// `POST /trades` (spec.md §6). Reserves the listing immediately (a
    /// second concurrent buyer sees `PreconditionFailed`, not a race on whose
    /// payment lands first) but moves no money yet — that happens in
    /// [`Self::pay`]. Resolves spec.md §9 open question: listing reservation
    /// is pessimistic at trade creation, not deferred to `payment_received`.
    pub async fn create_trade(&self, listing_id: i64, buyer_steam_id: u64) -> Result<Trade, EscrowError> {
        let listing = self.listings.get(listing_id).await?;
        if !listing.is_purchasable() {
            return Err(EscrowError::Authorization("listing is not active".into()));
        }
        listing.validate_invariants().map_err(|msg| EscrowError::Validation(msg.into()))?;
        if buyer_steam_id == listing.seller_steam_id {
            return Err(EscrowError::Validation("buyer cannot purchase their own listing".into()));
        }

        self.listings.set_status(listing_id, ListingStatus::Active, ListingStatus::Reserved).await?;

        let now = Utc::now();
        let pricing = Pricing::compute(listing.price, self.config.fee_percent);
        let trade = Trade {
            id: Uuid::new_v4(),
            listing_id,
            buyer_steam_id,
            seller_steam_id: listing.seller_steam_id,
            assigned_bot_steam_id: None,
            item: listing.item.clone(),
            pricing,
            currency: listing.currency.clone(),
            seller_offer_id: None,
            buyer_offer_id: None,
            status: TradeStatus::PendingPayment,
            cancel_requested: false,
            cancel_reason: None,
            retry_count: 0,
            notes: None,
            payment_received_at: None,
            seller_offer_sent_at: None,
            seller_offer_responded_at: None,
            buyer_offer_sent_at: None,
            buyer_offer_responded_at: None,
            completed_at: None,
            expires_at: now + chrono::Duration::from_std(self.config.trade_timeout).unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.trades.insert(trade.clone()).await?;
        self.notifier
            .notify(buyer_steam_id, NotificationKind::TradeCreated, serde_json::json!({"trade_id": trade.id}))
            .await
            .ok();
        Ok(trade)
    }

    /// `POST /trades/:id/pay` (spec.md §6): captures the buyer's funds, then
    /// cascades the trade forward via [`Self::advance`] in the same call so
    /// the caller sees the furthest state reachable without external input.
    ///
    /// The status precondition check below has a gap of its own between the
    /// read and the eventual `transition` call, so it alone can't stop two
    /// concurrent callers from both passing it and both reserving/capturing
    /// funds. `idempotency.try_claim` closes that gap: only the first of two
    /// concurrent `pay()` calls for the same trade wins the claim, the other
    /// gets `PreconditionFailed` before touching the wallet at all.
    pub async fn pay(&self, trade_id: Uuid) -> Result<Trade, EscrowError> {
        let trade = self.trades.get(trade_id).await?;
        if trade.status != TradeStatus::PendingPayment {
            return Err(EscrowError::PreconditionFailed);
        }
        if !self.idempotency.try_claim(trade_id, "pay").await {
            return Err(EscrowError::PreconditionFailed);
        }

        use escrow_types::TransactionKind;
        if !self.wallet.has_posted(trade_id, TransactionKind::Capture).await? {
            if !self.wallet.has_posted(trade_id, TransactionKind::DebitHold).await? {
                self.wallet.reserve(trade.buyer_steam_id, trade.pricing.price, trade_id, &trade.currency).await?;
            }
            self.wallet.capture(trade.buyer_steam_id, trade.pricing.price, trade_id, &trade.currency).await?;
        }

        let now = Utc::now();
        let await_leg = chrono::Duration::from_std(self.config.await_leg_timeout).unwrap_or_default();
        let saved = self
            .trades
            .transition(
                trade_id,
                Box::new(move |current| {
                    if current.status != TradeStatus::PendingPayment {
                        return Ok(current.clone());
                    }
                    let mut next = current.clone();
                    next.status = TradeStatus::PaymentReceived;
                    next.payment_received_at = Some(now);
                    next.expires_at = now + await_leg;
                    next.updated_at = now;
                    Ok(next)
                }),
            )
            .await?;

        self.notifier
            .notify(saved.seller_steam_id, NotificationKind::PaymentReceived, serde_json::json!({"trade_id": saved.id}))
            .await
            .ok();

        self.advance(trade_id).await
    }

    /// Marks `cancel_requested`; takes effect the next time the trade is
    /// stepped (immediately, if the caller follows up with `advance`).
    /// Actor is recorded for audit purposes only — legality is governed
    /// entirely by `TradeStatus::is_cancellable`.
    pub async fn request_cancel(&self, trade_id: Uuid, _actor: Actor, reason: String) -> Result<Trade, EscrowError> {
        self.trades
            .transition(
                trade_id,
                Box::new(move |current| {
                    let mut next = current.clone();
                    next.cancel_requested = true;
                    next.cancel_reason = Some(reason);
                    next.updated_at = Utc::now();
                    Ok(next)
                }),
            )
            .await?;
        self.advance(trade_id).await
    }

    /// The scheduler/reconciler's single entry point: walks the trade
    /// forward until either it reaches a terminal status, hits an external
    /// wait (an offer still `active`), or exhausts [`MAX_CASCADE_STEPS`].
    pub async fn advance(&self, trade_id: Uuid) -> Result<Trade, EscrowError> {
        let mut trade = self.trades.get(trade_id).await?;
        for _ in 0..MAX_CASCADE_STEPS {
            let before = trade.status;
            trade = self.step(trade).await?;
            if trade.status == before || trade.status.is_terminal() {
                break;
            }
        }
        Ok(trade)
    }

    async fn step(&self, trade: Trade) -> Result<Trade, EscrowError> {
        use TradeStatus::*;
        let now = Utc::now();

        if trade.cancel_requested && trade.status.is_cancellable() {
            return self.cancel(trade, now).await;
        }

        // Per-leg deadlines (`await_leg_timeout_seconds`) resolve to
        // `refunded`, matching the table's explicit `(awaiting_seller,
        // refunded)`/`(error_forwarding, refunded)` edges rather than the
        // generic `expired` wildcard — spec.md's S2 scenario ("peer sale,
        // seller timeout -> refund") names this outcome explicitly. Any
        // other non-terminal state stuck past its deadline (e.g.
        // `payment_received` with no bot available) falls through to the
        // generic expiry path instead, since those states have no direct
        // edge to `refunded`.
        if !trade.status.is_terminal() && trade.status != PendingPayment && trade.expires_at <= now {
            return match trade.status {
                AwaitingSeller | ErrorSending => self.refund_and_finish(trade, now, Refunded, "seller leg timed out").await,
                AwaitingBuyer | ErrorForwarding => self.mark_forwarding_failure(trade, now, "buyer leg timed out", true).await,
                _ => self.expire(trade, now).await,
            };
        }

        match trade.status {
            PendingPayment => Ok(trade),
            PaymentReceived => self.start_delivery(trade, now).await,
            AwaitingSeller => self.drive_seller_leg(trade, now).await,
            ErrorSending => self.resolve_retry(trade, now, AwaitingSeller).await,
            SellerAccepted => self.start_buyer_leg(trade, now).await,
            AwaitingBuyer => self.drive_buyer_leg(trade, now).await,
            ErrorForwarding => self.resolve_forwarding_retry(trade, now).await,
            BuyerAccepted => self.complete(trade, now).await,
            Completed | Cancelled | Refunded | Expired | Disputed => Ok(trade),
        }
    }

    async fn bot_client(&self, trade: &Trade) -> Result<Arc<dyn SteamClient>, EscrowError> {
        let bot_id = trade.assigned_bot_steam_id.ok_or_else(|| EscrowError::Internal("trade has no assigned bot".into()))?;
        let bot = self.fleet.bot(bot_id).ok_or_else(|| EscrowError::Internal(format!("assigned bot {bot_id} not in fleet")))?;
        Ok(bot.client())
    }

    async fn start_delivery(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        let listing = self.listings.get(trade.listing_id).await?;
        let target = match listing.kind {
            ListingKind::Peer => TradeStatus::AwaitingSeller,
            ListingKind::BotOwned => TradeStatus::AwaitingBuyer,
        };

        let bot = match trade.assigned_bot_steam_id {
            Some(id) => self.fleet.bot(id).ok_or_else(|| EscrowError::Internal(format!("assigned bot {id} not in fleet")))?,
            None => self.fleet.acquire(&[]).await.ok_or_else(|| EscrowError::Transient("no bot currently available".into()))?,
        };

        let mut next = trade.clone();
        next.assigned_bot_steam_id = Some(bot.steam_id());
        next.status = target;
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;

        let kind = if target == TradeStatus::AwaitingSeller { NotificationKind::AwaitingSeller } else { NotificationKind::AwaitingBuyer };
        let recipient = if target == TradeStatus::AwaitingSeller { saved.seller_steam_id } else { saved.buyer_steam_id };
        self.notifier.notify(recipient, kind, serde_json::json!({"trade_id": saved.id})).await.ok();
        Ok(saved)
    }

    async fn start_buyer_leg(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        let mut next = trade.clone();
        next.status = TradeStatus::AwaitingBuyer;
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;
        self.notifier
            .notify(saved.buyer_steam_id, NotificationKind::AwaitingBuyer, serde_json::json!({"trade_id": saved.id}))
            .await
            .ok();
        Ok(saved)
    }

    async fn drive_seller_leg(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        let client = self.bot_client(&trade).await?;

        if let Some(offer_id) = trade.seller_offer_id.clone() {
            return match client.poll_offer(&offer_id).await {
                Ok(OfferState::Accepted) => {
                    let mut next = trade.clone();
                    next.status = TradeStatus::SellerAccepted;
                    next.seller_offer_responded_at = Some(now);
                    next.updated_at = now;
                    self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
                }
                Ok(OfferState::Declined) | Ok(OfferState::Cancelled) | Ok(OfferState::Expired) => {
                    self.flagger.record(trade.seller_steam_id, RiskEventKind::RapidCancellations, Some(trade.id), None).await.ok();
                    self.refund_and_finish(trade, now, TradeStatus::Refunded, "seller declined or cancelled the offer").await
                }
                Ok(OfferState::Active) | Ok(OfferState::Invalid) => Ok(trade),
                Err(err) => self.handle_seller_error(trade, classify(err), now).await,
            };
        }

        let Some(seller_delivery_url) = self.listings.get(trade.listing_id).await?.seller_delivery_trade_url else {
            return Err(EscrowError::Validation("peer listing missing seller delivery trade url".into()));
        };
        let tradelink = Tradelink { partner_steam_id: trade.seller_steam_id, token: trade_url_token(&seller_delivery_url) };

        if let Some(cached) = self.idempotency.already_done(trade.id, "awaiting_seller").await {
            let mut next = trade.clone();
            next.seller_offer_id = Some(cached);
            next.seller_offer_sent_at = Some(now);
            next.updated_at = now;
            return self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await;
        }

        let asset = steam_trading::Asset {
            app_id: trade.item.app_id,
            context_id: trade.item.context_id.clone(),
            asset_id: trade.item.asset_id.clone(),
            amount: 1,
        };
        match client
            .send_offer(tradelink, AssetCollection::default(), AssetCollection::single(asset), Some(format!("escrow trade {}", trade.id)))
            .await
        {
            Ok(offer_id) => {
                self.idempotency.record(trade.id, "awaiting_seller", &offer_id).await;
                let mut next = trade.clone();
                next.seller_offer_id = Some(offer_id);
                next.seller_offer_sent_at = Some(now);
                next.updated_at = now;
                self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
            }
            Err(err) => self.handle_seller_error(trade, classify(err), now).await,
        }
    }

    async fn handle_seller_error(&self, trade: Trade, err: EscrowError, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        match err.class() {
            escrow_types::ErrorClass::Persistent => {
                self.flagger.record(trade.seller_steam_id, RiskEventKind::ItemMissing, Some(trade.id), None).await.ok();
                self.refund_and_finish(trade, now, TradeStatus::Refunded, "seller item no longer available").await
            }
            _ => {
                warn!(trade_id = %trade.id, error = %err, "seller leg transient failure, will retry");
                let mut next = trade.clone();
                next.status = TradeStatus::ErrorSending;
                next.retry_count += 1;
                next.notes = Some(err.to_string());
                next.updated_at = now;
                self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
            }
        }
    }

    async fn drive_buyer_leg(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        let client = self.bot_client(&trade).await?;

        if let Some(offer_id) = trade.buyer_offer_id.clone() {
            return match client.poll_offer(&offer_id).await {
                Ok(OfferState::Accepted) => self.complete_delivery(trade, now).await,
                Ok(OfferState::Declined) | Ok(OfferState::Cancelled) | Ok(OfferState::Expired) => {
                    self.mark_forwarding_failure(trade, now, "buyer declined or cancelled the offer", true).await
                }
                Ok(OfferState::Active) | Ok(OfferState::Invalid) => Ok(trade),
                Err(err) => self.handle_buyer_error(trade, classify(err), now).await,
            };
        }

        if let Some(cached) = self.idempotency.already_done(trade.id, "awaiting_buyer").await {
            let mut next = trade.clone();
            next.buyer_offer_id = Some(cached);
            next.buyer_offer_sent_at = Some(now);
            next.updated_at = now;
            return self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await;
        }

        let buyer = self.wallet.user(trade.buyer_steam_id).await?;
        let tradelink = Tradelink {
            partner_steam_id: trade.buyer_steam_id,
            token: buyer.delivery_trade_url.as_deref().and_then(trade_url_token),
        };
        let asset = steam_trading::Asset {
            app_id: trade.item.app_id,
            context_id: trade.item.context_id.clone(),
            asset_id: trade.item.asset_id.clone(),
            amount: 1,
        };
        match client
            .send_offer(tradelink, AssetCollection::single(asset), AssetCollection::default(), Some(format!("escrow trade {}", trade.id)))
            .await
        {
            Ok(offer_id) => {
                self.idempotency.record(trade.id, "awaiting_buyer", &offer_id).await;
                let mut next = trade.clone();
                next.buyer_offer_id = Some(offer_id);
                next.buyer_offer_sent_at = Some(now);
                next.updated_at = now;
                self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
            }
            Err(err) => self.handle_buyer_error(trade, classify(err), now).await,
        }
    }

    async fn handle_buyer_error(&self, trade: Trade, err: EscrowError, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        match err.class() {
            escrow_types::ErrorClass::Persistent => {
                self.flagger.record(trade.seller_steam_id, RiskEventKind::ItemMissing, Some(trade.id), None).await.ok();
                self.mark_forwarding_failure(trade, now, &err.to_string(), true).await
            }
            _ => {
                warn!(trade_id = %trade.id, error = %err, "buyer leg transient failure, will retry");
                self.mark_forwarding_failure(trade, now, &err.to_string(), false).await
            }
        }
    }

    /// Moves to `error_forwarding`, optionally leaving the permanent-failure
    /// marker that [`Self::resolve_forwarding_retry`] checks on the next
    /// step instead of attempting another resend.
    async fn mark_forwarding_failure(&self, trade: Trade, now: DateTime<Utc>, reason: &str, permanent: bool) -> Result<Trade, EscrowError> {
        let reason = reason.to_string();
        let mut next = trade.clone();
        next.status = TradeStatus::ErrorForwarding;
        if !permanent {
            next.retry_count += 1;
        }
        next.notes = Some(if permanent { PERMANENT_FORWARDING_FAILURE.to_string() } else { reason });
        next.updated_at = now;
        self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
    }

    /// `error_sending`'s own step: a pure decision, no Steam call. Either
    /// gives up (`disputed`) or hands control back to `target` to retry.
    async fn resolve_retry(&self, trade: Trade, now: DateTime<Utc>, target: TradeStatus) -> Result<Trade, EscrowError> {
        let mut next = trade.clone();
        if trade.retry_count >= self.config.max_retries {
            next.status = TradeStatus::Disputed;
            next.notes = Some("max retries exceeded on seller leg".into());
        } else {
            // Leaves `seller_offer_id` untouched: if the failure happened
            // while polling an already-sent offer, the retry polls it again;
            // if it happened while sending, the field is already `None` and
            // the retry sends fresh. Clearing it unconditionally here would
            // orphan a still-active offer and double-send on every retry.
            next.status = target;
        }
        next.updated_at = now;
        self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
    }

    async fn resolve_forwarding_retry(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        if trade.notes.as_deref() == Some(PERMANENT_FORWARDING_FAILURE) {
            return self.refund_and_finish(trade, now, TradeStatus::Refunded, "item could not be forwarded to buyer").await;
        }

        let mut next = trade.clone();
        if trade.retry_count >= self.config.max_retries {
            next.status = TradeStatus::Disputed;
            next.notes = Some("max retries exceeded on buyer leg".into());
        } else {
            next.status = TradeStatus::AwaitingBuyer;
            next.notes = None;
        }
        next.updated_at = now;
        self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
    }

    async fn complete_delivery(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        let mut next = trade.clone();
        next.status = TradeStatus::BuyerAccepted;
        next.buyer_offer_responded_at = Some(now);
        next.updated_at = now;
        self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await
    }

    async fn complete(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        self.wallet
            .payout(trade.seller_steam_id, trade.pricing.price, trade.pricing.platform_fee, trade.id, &trade.currency)
            .await?;

        let mut next = trade.clone();
        next.status = TradeStatus::Completed;
        next.completed_at = Some(now);
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;

        let _ = self.listings.set_status(saved.listing_id, ListingStatus::Reserved, ListingStatus::Sold).await;
        if let Some(bot_id) = saved.assigned_bot_steam_id {
            if let Some(bot) = self.fleet.bot(bot_id) {
                self.fleet.release(&bot).await;
            }
        }
        self.notifier.notify(saved.buyer_steam_id, NotificationKind::TradeCompleted, serde_json::json!({"trade_id": saved.id})).await.ok();
        self.notifier.notify(saved.seller_steam_id, NotificationKind::TradeCompleted, serde_json::json!({"trade_id": saved.id})).await.ok();
        info!(trade_id = %saved.id, "trade completed");
        Ok(saved)
    }

    async fn cancel(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        if trade.status != TradeStatus::PendingPayment {
            self.wallet.refund(trade.buyer_steam_id, trade.pricing.price, trade.id, &trade.currency).await?;
        }
        let reason = trade.cancel_reason.clone();
        let mut next = trade.clone();
        next.status = TradeStatus::Cancelled;
        next.cancel_reason = reason.or(Some("cancelled".into()));
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;
        self.release_after_terminal(&saved).await;
        self.notifier.notify(saved.buyer_steam_id, NotificationKind::TradeCancelled, serde_json::json!({"trade_id": saved.id})).await.ok();
        Ok(saved)
    }

    async fn expire(&self, trade: Trade, now: DateTime<Utc>) -> Result<Trade, EscrowError> {
        if trade.status != TradeStatus::PendingPayment {
            self.wallet.refund(trade.buyer_steam_id, trade.pricing.price, trade.id, &trade.currency).await?;
        }
        if let (Some(bot_id), Some(offer_id)) = (trade.assigned_bot_steam_id, trade.seller_offer_id.clone().or(trade.buyer_offer_id.clone())) {
            if let Some(bot) = self.fleet.bot(bot_id) {
                let _ = bot.client().cancel_offer(&offer_id).await;
            }
        }
        let mut next = trade.clone();
        next.status = TradeStatus::Expired;
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;
        self.release_after_terminal(&saved).await;
        self.notifier.notify(saved.buyer_steam_id, NotificationKind::TradeExpired, serde_json::json!({"trade_id": saved.id})).await.ok();
        Ok(saved)
    }

    async fn refund_and_finish(&self, trade: Trade, now: DateTime<Utc>, target: TradeStatus, reason: &str) -> Result<Trade, EscrowError> {
        self.wallet.refund(trade.buyer_steam_id, trade.pricing.price, trade.id, &trade.currency).await?;
        let reason = reason.to_string();
        let mut next = trade.clone();
        next.status = target;
        next.notes = Some(reason);
        next.updated_at = now;
        let saved = self.trades.transition(trade.id, Box::new(move |_| Ok(next.clone()))).await?;
        self.release_after_terminal(&saved).await;
        let kind = if target == TradeStatus::Disputed { NotificationKind::TradeDisputed } else { NotificationKind::TradeRefunded };
        self.notifier.notify(saved.buyer_steam_id, kind, serde_json::json!({"trade_id": saved.id})).await.ok();
        Ok(saved)
    }

    /// `POST /admin/trades/:uuid/dispute-resolve`: an admin's manual close-out
    /// of a `disputed` trade the state machine gave up on retrying by itself.
    /// Reuses the same wallet/notification paths as the automatic outcomes
    /// rather than writing a third, admin-only code path for moving money.
    pub async fn admin_resolve_dispute(&self, trade_id: Uuid, outcome: DisputeOutcome) -> Result<Trade, EscrowError> {
        let trade = self.trades.get(trade_id).await?;
        if trade.status != TradeStatus::Disputed {
            return Err(EscrowError::PreconditionFailed);
        }
        let now = Utc::now();
        match outcome {
            DisputeOutcome::Refund => self.refund_and_finish(trade, now, TradeStatus::Refunded, "resolved by admin: refund").await,
            DisputeOutcome::Complete => self.complete(trade, now).await,
        }
    }

    async fn release_after_terminal(&self, trade: &Trade) {
        let _ = self.listings.set_status(trade.listing_id, ListingStatus::Reserved, ListingStatus::Active).await;
        if let Some(bot_id) = trade.assigned_bot_steam_id {
            if let Some(bot) = self.fleet.bot(bot_id) {
                self.fleet.release(&bot).await;
            }
        }
    }
}
