use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    DebitHold,
    ReleaseHold,
    Capture,
    Payout,
    Fee,
    Refund,
    Adjust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Posted,
    Reversed,
}

/// Append-only double-entry ledger row (spec.md §3 "Transaction").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub trade_id: Uuid,
    pub subject_steam_id: u64,
    pub kind: TransactionKind,
    /// Signed: negative debits the subject, positive credits.
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub external_provider_ref: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}
