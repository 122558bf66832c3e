use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TradeCreated,
    PaymentReceived,
    AwaitingSeller,
    AwaitingBuyer,
    TradeCompleted,
    TradeRefunded,
    TradeExpired,
    TradeDisputed,
    TradeCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_steam_id: u64,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Retention window from spec.md §3: "Retention: 7 days after creation."
    pub const RETENTION: chrono::Duration = chrono::Duration::days(7);

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Self::RETENTION
    }
}
