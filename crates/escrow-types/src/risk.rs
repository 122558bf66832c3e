use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event observed by the fraud flagger (C12), e.g. "api key changed",
/// "item missing", "rapid cancellations", "ownership check failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    ApiKeyChanged,
    ItemMissing,
    RapidCancellations,
    OwnershipCheckFailed,
}

impl RiskEventKind {
    /// Default per-event weights (spec.md §9's open thresholds, resolved in
    /// DESIGN.md). Overridable via `escrow-config`.
    pub fn default_weight(self) -> i32 {
        match self {
            RiskEventKind::ApiKeyChanged => 20,
            RiskEventKind::ItemMissing => 40,
            RiskEventKind::RapidCancellations => 15,
            RiskEventKind::OwnershipCheckFailed => 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: i64,
    pub user_steam_id: u64,
    pub kind: RiskEventKind,
    pub weight: i32,
    pub trade_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
