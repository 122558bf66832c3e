//! Inbound HTTP surface from spec.md §6, plus the admin endpoints
//! SPEC_FULL.md §6 adds on top of it.

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use escrow_engine::ListingStore;
use escrow_store::listing_store::{insert_listing, update_listing};
use escrow_store::trade_store::{history_for, list_trades};
use escrow_types::{
    Actor, DisputeOutcome, ItemSnapshot, Listing, ListingKind, ListingStatus, Trade, TradeStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", post(create_trade))
        .route("/trades/:uuid", get(get_trade))
        .route("/trades/:uuid/pay", post(pay_trade))
        .route("/trades/:uuid/cancel", post(cancel_trade))
        .route("/listings", post(create_listing))
        .route("/listings/:id", patch(update_listing_handler).delete(delete_listing))
        .route("/wallet", get(get_wallet))
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/withdraw", post(withdraw))
        .route("/admin/trades", get(admin_list_trades))
        .route("/admin/trades/:uuid/dispute-resolve", post(admin_resolve_dispute))
        .route("/admin/listings/:id/feature", patch(admin_feature_listing))
        .route("/admin/bots", get(admin_list_bots))
}

#[derive(Debug, Deserialize)]
struct CreateTradeRequest {
    listing_id: i64,
    buyer_steam_id: u64,
    buyer_trade_url: Option<String>,
}

async fn create_trade(State(state): State<AppState>, Json(req): Json<CreateTradeRequest>) -> Result<Json<Trade>, ApiError> {
    if let Some(trade_url) = req.buyer_trade_url {
        state.wallet.set_delivery_trade_url(req.buyer_steam_id, trade_url).await?;
    }
    let trade = state.engine.create_trade(req.listing_id, req.buyer_steam_id).await?;
    Ok(Json(trade))
}

#[derive(Debug, Serialize)]
struct TradeDetail {
    #[serde(flatten)]
    trade: Trade,
    history: Vec<escrow_types::HistoryRow>,
}

async fn get_trade(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> Result<Json<TradeDetail>, ApiError> {
    let trade = state.engine.get(uuid).await?;
    let history = history_for(&state.pool, uuid, 100).await?;
    Ok(Json(TradeDetail { trade, history }))
}

async fn pay_trade(State(state): State<AppState>, Path(uuid): Path<Uuid>) -> Result<Json<Trade>, ApiError> {
    Ok(Json(state.engine.pay(uuid).await?))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    #[serde(default = "default_user_actor")]
    actor: Actor,
    reason: String,
}

fn default_user_actor() -> Actor {
    Actor::User
}

async fn cancel_trade(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Trade>, ApiError> {
    Ok(Json(state.engine.request_cancel(uuid, req.actor, req.reason).await?))
}

#[derive(Debug, Deserialize)]
struct CreateListingRequest {
    seller_steam_id: u64,
    item: ItemSnapshot,
    price: Decimal,
    currency: String,
    kind: ListingKind,
    seller_delivery_trade_url: Option<String>,
}

async fn create_listing(State(state): State<AppState>, Json(req): Json<CreateListingRequest>) -> Result<Json<Listing>, ApiError> {
    let now = Utc::now();
    let listing = Listing {
        id: 0,
        seller_steam_id: req.seller_steam_id,
        item: req.item,
        price: req.price,
        currency: req.currency,
        kind: req.kind,
        status: ListingStatus::Active,
        views: 0,
        is_featured: false,
        seller_delivery_trade_url: req.seller_delivery_trade_url,
        created_at: now,
        updated_at: now,
    };
    listing.validate_invariants().map_err(|msg| escrow_types::EscrowError::Validation(msg.to_string()))?;

    let id = insert_listing(&state.pool, &listing).await?;
    let listing = state.listings.get(id).await?;
    Ok(Json(listing))
}

#[derive(Debug, Deserialize)]
struct UpdateListingRequest {
    price: Option<Decimal>,
    is_featured: Option<bool>,
}

async fn update_listing_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateListingRequest>,
) -> Result<Json<Listing>, ApiError> {
    Ok(Json(update_listing(&state.pool, id, req.price, req.is_featured).await?))
}

async fn delete_listing(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Listing>, ApiError> {
    let current = state.listings.get(id).await?;
    Ok(Json(state.listings.set_status(id, current.status, ListingStatus::Removed).await?))
}

#[derive(Debug, Deserialize)]
struct WalletQuery {
    steam_id: u64,
}

async fn get_wallet(State(state): State<AppState>, Query(query): Query<WalletQuery>) -> Result<Json<escrow_types::User>, ApiError> {
    Ok(Json(state.wallet.user(query.steam_id).await?))
}

#[derive(Debug, Deserialize)]
struct WalletAdjustRequest {
    steam_id: u64,
    amount: Decimal,
    currency: String,
}

async fn deposit(State(state): State<AppState>, Json(req): Json<WalletAdjustRequest>) -> Result<Json<escrow_types::User>, ApiError> {
    let reference = Uuid::new_v4();
    Ok(Json(state.wallet.deposit(req.steam_id, req.amount, reference, &req.currency).await?))
}

async fn withdraw(State(state): State<AppState>, Json(req): Json<WalletAdjustRequest>) -> Result<Json<escrow_types::User>, ApiError> {
    let reference = Uuid::new_v4();
    Ok(Json(state.wallet.withdraw(req.steam_id, req.amount, reference, &req.currency).await?))
}

#[derive(Debug, Deserialize)]
struct AdminTradesQuery {
    status: Option<TradeStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn admin_list_trades(State(state): State<AppState>, Query(query): Query<AdminTradesQuery>) -> Result<Json<Vec<Trade>>, ApiError> {
    let trades = list_trades(&state.pool, query.status, query.limit.unwrap_or(50), query.offset.unwrap_or(0)).await?;
    Ok(Json(trades))
}

#[derive(Debug, Deserialize)]
struct DisputeResolveRequest {
    outcome: DisputeOutcome,
}

async fn admin_resolve_dispute(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<DisputeResolveRequest>,
) -> Result<Json<Trade>, ApiError> {
    Ok(Json(state.engine.admin_resolve_dispute(uuid, req.outcome).await?))
}

#[derive(Debug, Deserialize)]
struct FeatureRequest {
    is_featured: bool,
}

async fn admin_feature_listing(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<FeatureRequest>,
) -> Result<Json<Listing>, ApiError> {
    Ok(Json(update_listing(&state.pool, id, None, Some(req.is_featured)).await?))
}

async fn admin_list_bots(State(state): State<AppState>) -> Json<Vec<escrow_types::Bot>> {
    let mut snapshots = Vec::with_capacity(state.fleet.all_bots().len());
    for bot in state.fleet.all_bots() {
        snapshots.push(bot.snapshot().await);
    }
    Json(snapshots)
}
