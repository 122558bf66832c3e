//! C11 + C12: audit log and fraud flagger.
//!
//! The trade engine's own state transitions already write their history row
//! as part of the transition's database transaction (spec.md §4.3 step 4);
//! what this crate owns is the orthogonal concern from §4.8 — a per-user
//! risk score accumulated from observed events, independent of any single
//! trade's lifecycle.

#![deny(missing_debug_implementations, unsafe_code)]

pub mod flagger;
pub mod store;

pub use flagger::FraudFlagger;
pub use store::{InMemoryRiskStore, RiskStore};
