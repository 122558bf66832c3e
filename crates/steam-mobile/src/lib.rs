//! Steam Guard Mobile Authenticator.
//!
//! Handles login via TOTP, cookie/session persistence and restore, and
//! mobile confirmations (trade offer accept/deny) for a single bot account.
//! This is the foundation `steam-trading` builds its typed trade-offer
//! operations on top of.
//!
//! Adapted from the original `steam-mobile` crate, generalized from a single
//! account read out of the process environment to an arbitrary bot's
//! [`escrow_types::BotSecrets`], since the bot fleet manager (C6) owns many
//! concurrently logged-in accounts, not one.

#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_import_braces,
    unused_qualifications
)]

mod client;
mod confirmations;
mod errors;
mod totp;

pub use client::{SteamAuthenticator, STEAM_COMMUNITY_HOST};
pub use confirmations::{Confirmation, ConfirmationMethod};
pub use errors::AuthenticatorError;
pub use totp::{confirmation_key, login_code, CLOCK_SKEW_TOLERANCE_SECS};
