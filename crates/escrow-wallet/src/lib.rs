//! C7: the wallet ledger.
//!
//! Double-entry bookkeeping over `escrow-types::User.{balance,reserved}` and
//! an append-only `Transaction` journal. `reserve`/`release` move money
//! between `available` and `reserved` without touching the ledger; every
//! other operation posts a ledger entry and moves `balance` in the same
//! store call, so a crash never leaves a transition applied without its
//! matching ledger row or vice versa (spec.md §4.5's "committed atomically").

#![deny(missing_debug_implementations, unsafe_code)]

pub mod ledger;
pub mod store;

pub use ledger::WalletLedger;
pub use store::{InMemoryWalletStore, WalletStore};

/// Pseudo-accounts the ledger posts `capture`/`fee` entries against. Neither
/// is a real Steam id (both are far below the 17-digit range), so they can
/// never collide with an actual user.
pub const PLATFORM_ESCROW_ACCOUNT: u64 = 0;
pub const PLATFORM_FEE_ACCOUNT: u64 = 1;
