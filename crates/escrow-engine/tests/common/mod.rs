use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use escrow_audit::{FraudFlagger, InMemoryRiskStore};
use escrow_engine::{EngineConfig, IdempotencyGuard, InMemoryListingStore, InMemoryTradeStore, TradeEngine};
use escrow_fleet::{BotWorker, FleetConfig, FleetManager};
use escrow_kv::InMemoryKv;
use escrow_notify::{InMemoryNotificationStore, Notifier, PushRegistry};
use escrow_types::{Bot, BotSecrets, BotStatus, ItemSnapshot, Listing, ListingKind, ListingStatus, User};
use escrow_wallet::{InMemoryWalletStore, WalletLedger};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use steam_trading::MockSteamClient;

pub fn sample_item(asset_id: &str) -> ItemSnapshot {
    ItemSnapshot {
        asset_id: asset_id.to_string(),
        market_hash_name: "AK-47 | Redline".into(),
        app_id: 730,
        context_id: "2".into(),
        icon_url: "icon".into(),
        rarity: Some("Classified".into()),
        exterior: Some("Field-Tested".into()),
        float_value: Some("0.21".into()),
        sticker_set: vec![],
    }
}

pub fn bot_owned_listing(id: i64, seller: u64, price: Decimal) -> Listing {
    Listing {
        id,
        seller_steam_id: seller,
        item: sample_item("asset-1"),
        price,
        currency: "USD".into(),
        kind: ListingKind::BotOwned,
        status: ListingStatus::Active,
        views: 0,
        is_featured: false,
        seller_delivery_trade_url: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn peer_listing(id: i64, seller: u64, price: Decimal, seller_delivery_url: &str) -> Listing {
    Listing {
        seller_delivery_trade_url: Some(seller_delivery_url.to_string()),
        kind: ListingKind::Peer,
        ..bot_owned_listing(id, seller, price)
    }
}

pub fn user(steam_id: u64, balance: Decimal) -> User {
    User {
        steam_id,
        display_name: format!("user-{steam_id}"),
        avatar_url: None,
        delivery_trade_url: Some(format!("https://steamcommunity.com/tradeoffer/new/?partner={steam_id}&token=tok{steam_id}")),
        balance,
        reserved: Decimal::ZERO,
        risk_score: 0,
        flagged_for_review: false,
        banned: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn bot_row(steam_id: u64) -> Bot {
    Bot {
        steam_id,
        account_name: format!("bot{steam_id}"),
        status: BotStatus::Offline,
        inventory_size: 0,
        active_trade_count: 0,
        last_error: None,
        last_online_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn bot_secrets(steam_id: u64) -> BotSecrets {
    BotSecrets {
        account_name: format!("bot{steam_id}"),
        password: "x".into(),
        totp_shared_secret: "AAAAAAAAAAAAAAAA".into(),
        identity_secret: "AAAAAAAAAAAAAAAA".into(),
    }
}

/// A fully wired [`TradeEngine`] plus the handles tests need to poke at
/// ground truth directly: seeded stores, a mock bot fleet, and the push
/// registry (so a test can assert what a connected client would see).
pub struct World {
    pub engine: Arc<TradeEngine>,
    pub listings: Arc<InMemoryListingStore>,
    pub wallet_store: Arc<InMemoryWalletStore>,
    pub trades: Arc<InMemoryTradeStore>,
    pub risk: Arc<InMemoryRiskStore>,
    pub bots: Vec<Arc<MockSteamClient>>,
    pub fleet: Arc<FleetManager>,
}

/// `await_leg_timeout` defaults short enough that timeout-path tests don't
/// need to sleep for the production 30-minute window.
pub fn build_world(bot_count: u64, await_leg_timeout: Duration) -> World {
    let listings = Arc::new(InMemoryListingStore::new());
    let wallet_store = Arc::new(InMemoryWalletStore::new());
    let trades = Arc::new(InMemoryTradeStore::new());
    let risk = Arc::new(InMemoryRiskStore::new());
    let kv = Arc::new(InMemoryKv::new());

    let mut bots = Vec::new();
    let mut workers = Vec::new();
    for i in 1..=bot_count {
        let steam_id = 900_000 + i;
        let mock = Arc::new(MockSteamClient::new(steam_id));
        bots.push(mock.clone());
        workers.push(BotWorker::new(bot_row(steam_id), bot_secrets(steam_id), mock));
    }
    let fleet = Arc::new(FleetManager::new(workers, kv.clone(), FleetConfig::default()));

    let wallet = WalletLedger::new(wallet_store.clone());
    let notifier = Arc::new(Notifier::new(Arc::new(InMemoryNotificationStore::new()), Arc::new(PushRegistry::new())));
    let flagger = Arc::new(FraudFlagger::new(risk.clone(), 50));
    let idempotency = IdempotencyGuard::new(kv.clone(), Duration::from_secs(3600));

    let config = EngineConfig {
        trade_timeout: Duration::from_secs(3600),
        await_leg_timeout,
        max_retries: 2,
        fee_percent: dec!(5.0),
    };

    let engine = Arc::new(TradeEngine::new(trades.clone(), listings.clone(), wallet, fleet.clone(), notifier, flagger, idempotency, config));

    World { engine, listings, wallet_store, trades, risk, bots, fleet }
}

impl World {
    pub async fn init_fleet(&self) {
        self.fleet.initialize_all().await;
    }

    pub fn seed_user(&self, u: User) {
        self.wallet_store.seed_user(u);
    }

    pub fn seed_listing(&self, l: Listing) {
        self.listings.seed(l);
    }
}
