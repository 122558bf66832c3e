//! C2: the persistent SQL store — the single source of truth spec.md §5
//! names, with `escrow-kv` holding only what can be reconstructed from here
//! or from external calls.
//!
//! Every repository in this crate implements a storage-seam trait owned by
//! a different crate (`escrow_engine::TradeStore`, `escrow_wallet::
//! WalletStore`, ...) rather than exposing its own bespoke API, so the rest
//! of the workspace depends only on those traits and can be tested against
//! the `InMemory*` fakes that already live beside them.

#![deny(missing_debug_implementations, unsafe_code)]

pub mod bot_repo;
pub mod listing_store;
pub mod mapping;
pub mod notification_store;
pub mod risk_store;
pub mod secrets;
pub mod trade_store;
pub mod wallet_store;

use std::time::Duration;

use escrow_types::{DbError, EscrowError};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

pub use bot_repo::BotRepository;
pub use listing_store::PgListingStore;
pub use notification_store::PgNotificationStore;
pub use risk_store::PgRiskStore;
pub use secrets::SecretBox;
pub use trade_store::PgTradeStore;
pub use wallet_store::PgWalletStore;

/// Connects to Postgres and runs pending migrations. Called once at
/// startup by `services/escrow-orchestrator`.
pub async fn connect(database_url: &str) -> Result<PgPool, EscrowError> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(to_escrow_error)?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| EscrowError::Database(DbError(e.to_string())))?;
    Ok(pool)
}

pub(crate) fn to_escrow_error(err: sqlx::Error) -> EscrowError {
    match &err {
        sqlx::Error::RowNotFound => EscrowError::NotFound(err.to_string()),
        _ => EscrowError::Database(DbError(err.to_string())),
    }
}

/// Reads an `Option<Vec<String>>`-shaped JSONB column (`listings.sticker_set`,
/// `escrow_trades.sticker_set`) into `Vec<String>`.
pub(crate) fn sticker_set_from_row(row: &PgRow, column: &str) -> Result<Vec<String>, EscrowError> {
    let raw: serde_json::Value = row.try_get(column).map_err(to_escrow_error)?;
    serde_json::from_value(raw).map_err(|e| EscrowError::Internal(format!("malformed sticker_set column: {e}")))
}
