//! Shared application state handed to every Axum handler.

use std::sync::Arc;

use escrow_config::Settings;
use escrow_engine::{ListingStore, TradeEngine};
use escrow_fleet::FleetManager;
use escrow_notify::Notifier;
use escrow_wallet::WalletLedger;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<TradeEngine>,
    pub wallet: WalletLedger,
    pub fleet: Arc<FleetManager>,
    pub notifier: Arc<Notifier>,
    pub listings: Arc<dyn ListingStore>,
    /// Direct pool access for reads/writes that sit beside the trade engine
    /// rather than inside it: listing CRUD, trade history, admin listing.
    pub pool: PgPool,
    pub settings: Arc<Settings>,
}
