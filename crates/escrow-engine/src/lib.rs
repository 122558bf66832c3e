//! C8 + C9: the trade state machine and the background reconciler that
//! drives it forward without relying on inbound Steam webhooks.
//!
//! Everything here is expressed against the [`TradeStore`]/[`ListingStore`]
//! seams this crate owns (the same trait-plus-`InMemory*`-fake shape as
//! `escrow_wallet::WalletStore` and `escrow_notify::NotificationStore`) so
//! [`engine::TradeEngine`] can be driven end-to-end in tests without a
//! database, Redis, or real Steam account.

#![deny(missing_debug_implementations, unsafe_code)]

pub mod engine;
pub mod idempotency;
pub mod listing_store;
pub mod reconciler;
pub mod scheduler;
pub mod trade_store;

pub use engine::{EngineConfig, TradeEngine};
pub use idempotency::IdempotencyGuard;
pub use listing_store::{InMemoryListingStore, ListingStore};
pub use reconciler::Reconciler;
pub use scheduler::Scheduler;
pub use trade_store::{InMemoryTradeStore, TradeStore};
