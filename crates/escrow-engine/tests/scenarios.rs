//! End-to-end scenarios from spec.md §8, driven against the in-memory
//! stores + [`steam_trading::MockSteamClient`] fleet built by
//! `tests/common/mod.rs`. No database, Redis, or real Steam account.

mod common;

use std::time::Duration;

use common::{bot_owned_listing, build_world, peer_listing, user};
use escrow_types::{Actor, EscrowError, TradeStatus, TransactionKind};
use escrow_wallet::{WalletStore, PLATFORM_FEE_ACCOUNT};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn count_kind(store: &impl WalletStore, steam_id: u64, trade_id: Uuid, kind: TransactionKind) -> usize {
    store
        .transactions_for_user(steam_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.trade_id == trade_id && t.kind == kind)
        .count()
}

/// S1: happy bot-owned sale. Buyer pays $40 on a $100 balance with a 5%
/// platform fee; the single bot already holds the item, so the engine skips
/// straight to `awaiting_buyer`. Buyer accepting completes the trade with
/// exactly one `capture` and one `payout`/`fee` pair.
#[tokio::test]
async fn s1_happy_bot_owned_sale() {
    let world = build_world(1, Duration::from_secs(1800));
    world.init_fleet().await;

    world.seed_user(user(100, dec!(100.00)));
    world.seed_user(user(200, dec!(0.00)));
    world.seed_listing(bot_owned_listing(1, 200, dec!(40.00)));

    let trade = world.engine.create_trade(1, 100).await.unwrap();
    let trade = world.engine.pay(trade.id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::AwaitingBuyer);

    let bot = &world.bots[0];
    assert_eq!(bot.sent_offer_count(), 1);
    let buyer_offer_id = trade.buyer_offer_id.clone().expect("buyer offer sent");
    bot.resolve_offer(&buyer_offer_id, steam_trading::OfferState::Accepted);

    let trade = world.engine.advance(trade.id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);

    let buyer = world.wallet_store.get_user(100).await.unwrap();
    let seller = world.wallet_store.get_user(200).await.unwrap();
    assert_eq!(buyer.balance, dec!(60.00));
    assert_eq!(buyer.reserved, dec!(0.00));
    assert_eq!(seller.balance, dec!(38.00));

    assert!(count_kind(world.wallet_store.as_ref(), 100, trade.id, TransactionKind::Capture).await <= 1);
    assert_eq!(count_kind(world.wallet_store.as_ref(), 200, trade.id, TransactionKind::Payout).await, 1);
    assert_eq!(count_kind(world.wallet_store.as_ref(), PLATFORM_FEE_ACCOUNT, trade.id, TransactionKind::Fee).await, 1);

    let listing = world.listings.get(1).await.unwrap();
    assert_eq!(listing.status, escrow_types::ListingStatus::Sold);
}

/// S2: peer sale where the seller never accepts the bot's request within the
/// per-leg timeout. Expected: refund, buyer balance restored, no payout, the
/// (still-active, per the mock) seller offer is left alone by the reconciler
/// path — the trade's own engine call that discovers the deadline refunds
/// without a second `pay`.
#[tokio::test]
async fn s2_peer_sale_seller_times_out() {
    let world = build_world(1, Duration::from_millis(20));
    world.init_fleet().await;

    world.seed_user(user(100, dec!(100.00)));
    world.seed_user(user(200, dec!(0.00)));
    world.seed_listing(peer_listing(1, 200, dec!(40.00), "https://steamcommunity.com/tradeoffer/new/?partner=200&token=tokseller"));

    let trade = world.engine.create_trade(1, 100).await.unwrap();
    let trade = world.engine.pay(trade.id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::AwaitingSeller);
    assert!(trade.seller_offer_id.is_some());

    tokio::time::sleep(Duration::from_millis(40)).await;

    let trade = world.engine.advance(trade.id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Refunded);

    let buyer = world.wallet_store.get_user(100).await.unwrap();
    assert_eq!(buyer.balance, dec!(100.00));
    assert_eq!(buyer.reserved, dec!(0.00));

    assert_eq!(count_kind(world.wallet_store.as_ref(), 200, trade.id, TransactionKind::Payout).await, 0);
    assert_eq!(count_kind(world.wallet_store.as_ref(), 100, trade.id, TransactionKind::Refund).await, 1);

    let listing = world.listings.get(1).await.unwrap();
    assert_eq!(listing.status, escrow_types::ListingStatus::Active);
}

/// S4: concurrent cancel + accept on the same trade. The row lock inside
/// `InMemoryTradeStore::transition` serializes both callers onto one of two
/// legal outcomes — the seller's offer gets accepted before the item is
/// committed is no longer cancellable (`is_cancellable` excludes
/// `seller_accepted` onward), so whichever call's `advance` observes the
/// acceptance first decides the trade's fate, and the other either actually
/// cancels it beforehand or harmlessly no-ops its cancel flag. Either way
/// there is never more than one refund and never a payout this early.
#[tokio::test]
async fn s4_concurrent_cancel_and_accept_serializes() {
    let world = build_world(1, Duration::from_secs(1800));
    world.init_fleet().await;

    world.seed_user(user(100, dec!(100.00)));
    world.seed_user(user(200, dec!(0.00)));
    world.seed_listing(peer_listing(1, 200, dec!(40.00), "https://steamcommunity.com/tradeoffer/new/?partner=200&token=tokseller"));

    let trade = world.engine.create_trade(1, 100).await.unwrap();
    let trade = world.engine.pay(trade.id).await.unwrap();
    assert_eq!(trade.status, TradeStatus::AwaitingSeller);

    let bot = &world.bots[0];
    let seller_offer_id = trade.seller_offer_id.clone().unwrap();
    bot.resolve_offer(&seller_offer_id, steam_trading::OfferState::Accepted);

    let engine_a = world.engine.clone();
    let engine_b = world.engine.clone();
    let trade_id = trade.id;

    let (cancel_res, advance_res) =
        tokio::join!(engine_a.request_cancel(trade_id, Actor::User, "changed my mind".into()), engine_b.advance(trade_id));
    assert!(cancel_res.is_ok());
    assert!(advance_res.is_ok());

    let final_trade = world.engine.get(trade_id).await.unwrap();
    assert!(matches!(final_trade.status, TradeStatus::Cancelled | TradeStatus::SellerAccepted | TradeStatus::AwaitingBuyer));

    let payouts = count_kind(world.wallet_store.as_ref(), 200, trade_id, TransactionKind::Payout).await;
    let refunds = count_kind(world.wallet_store.as_ref(), 100, trade_id, TransactionKind::Refund).await;
    assert_eq!(payouts, 0);
    match final_trade.status {
        TradeStatus::Cancelled => assert_eq!(refunds, 1),
        _ => assert_eq!(refunds, 0),
    }
}

/// S6: double pay. Two concurrent `POST /trades/:uuid/pay` calls for the
/// same trade; exactly one succeeds in capturing funds, the other gets a
/// precondition-violation error with no side effect.
#[tokio::test]
async fn s6_double_pay_only_one_captures() {
    let world = build_world(1, Duration::from_secs(1800));
    world.init_fleet().await;

    world.seed_user(user(100, dec!(100.00)));
    world.seed_user(user(200, dec!(0.00)));
    world.seed_listing(bot_owned_listing(1, 200, dec!(40.00)));

    let trade = world.engine.create_trade(1, 100).await.unwrap();

    let engine_a = world.engine.clone();
    let engine_b = world.engine.clone();
    let trade_id = trade.id;

    let (res_a, res_b) = tokio::join!(engine_a.pay(trade_id), engine_b.pay(trade_id));

    let successes = [&res_a, &res_b].into_iter().filter(|r| r.is_ok()).count();
    let failures = [&res_a, &res_b].into_iter().filter(|r| matches!(r, Err(EscrowError::PreconditionFailed))).count();
    assert_eq!(successes, 1);
    assert_eq!(failures, 1);

    assert_eq!(count_kind(world.wallet_store.as_ref(), 100, trade_id, TransactionKind::DebitHold).await, 1);
    assert_eq!(count_kind(world.wallet_store.as_ref(), 100, trade_id, TransactionKind::Capture).await, 1);

    let buyer = world.wallet_store.get_user(100).await.unwrap();
    assert_eq!(buyer.balance, dec!(60.00));
    assert_eq!(buyer.reserved, dec!(0.00));
}
