//! Typed Steam trade-offer client (C5): send/accept/cancel/poll offers and
//! fetch inventories, rate-limited and retry-aware.
//!
//! Generalizes the teacher's `SteamTradeManager`, which hardcoded a single
//! always-logged-in account, into a [`client::SteamClient`] trait with one
//! [`production::SteamTradeClient`] instance per bot in the fleet (C6), all
//! sharing the process-wide rate limiter (C4).

#![deny(missing_debug_implementations, unsafe_code)]

pub mod client;
pub mod errors;
pub mod production;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::SteamClient;
pub use errors::{OfferError, TradeError};
pub use production::SteamTradeClient;
pub use retry::with_retry;
pub use types::{Asset, AssetCollection, OfferState, TradeOffer, Tradelink};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockSteamClient;
