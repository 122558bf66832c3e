use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::listing::ItemSnapshot;

/// The trade lifecycle, verbatim from spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    PendingPayment,
    PaymentReceived,
    AwaitingSeller,
    SellerAccepted,
    AwaitingBuyer,
    BuyerAccepted,
    Completed,
    Cancelled,
    Refunded,
    Expired,
    Disputed,
    ErrorSending,
    ErrorForwarding,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Cancelled | TradeStatus::Refunded | TradeStatus::Expired
        )
    }

    /// Whether `self -> target` is a legal edge per spec.md §4.3.
    ///
    /// This is the single source of truth for "legal transitions only"
    /// (testable property #5): history rows are only ever written for edges
    /// this function accepts.
    pub fn can_transition_to(self, target: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, target),
            (PendingPayment, PaymentReceived)
                | (PaymentReceived, AwaitingSeller)
                | (PaymentReceived, AwaitingBuyer)
                | (AwaitingSeller, SellerAccepted)
                | (AwaitingSeller, ErrorSending)
                | (AwaitingSeller, Refunded)
                | (ErrorSending, AwaitingSeller)
                | (ErrorSending, Refunded)
                | (ErrorSending, Disputed)
                | (SellerAccepted, AwaitingBuyer)
                | (AwaitingBuyer, BuyerAccepted)
                | (AwaitingBuyer, ErrorForwarding)
                | (AwaitingBuyer, Disputed)
                | (ErrorForwarding, AwaitingBuyer)
                | (ErrorForwarding, Disputed)
                | (ErrorForwarding, Refunded)
                | (BuyerAccepted, Completed)
                | (Disputed, Refunded)
                | (Disputed, Completed)
        ) || (self.is_cancellable() && target == Cancelled)
            || (!self.is_terminal() && target == Expired && self != PendingPayment)
    }

    /// "any non-terminal → `cancelled` on explicit user/admin action before
    /// item committed" (spec.md §4.3). Once the bot has taken custody of the
    /// item (`seller_accepted` and beyond) cancellation is no longer a plain
    /// state change — a dispute or refund path is used instead.
    pub fn is_cancellable(self) -> bool {
        use TradeStatus::*;
        matches!(self, PendingPayment | PaymentReceived | AwaitingSeller | ErrorSending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub price: Decimal,
    pub fee_percent: Decimal,
    pub platform_fee: Decimal,
    pub seller_payout: Decimal,
}

impl Pricing {
    /// Computes fee and payout from `price`/`fee_percent`, rounded to 2
    /// fractional digits as required by the decimal(10,2) schema (§6).
    pub fn compute(price: Decimal, fee_percent: Decimal) -> Self {
        let fee = (price * fee_percent / Decimal::ONE_HUNDRED).round_dp(2);
        let payout = (price - fee).round_dp(2);
        Self {
            price,
            fee_percent,
            platform_fee: fee,
            seller_payout: payout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub listing_id: i64,
    pub buyer_steam_id: u64,
    pub seller_steam_id: u64,
    pub assigned_bot_steam_id: Option<u64>,
    pub item: ItemSnapshot,
    pub pricing: Pricing,
    pub currency: String,
    pub seller_offer_id: Option<String>,
    pub buyer_offer_id: Option<String>,
    pub status: TradeStatus,
    pub cancel_requested: bool,
    pub cancel_reason: Option<String>,
    pub retry_count: i32,
    pub notes: Option<String>,
    pub payment_received_at: Option<DateTime<Utc>>,
    pub seller_offer_sent_at: Option<DateTime<Utc>>,
    pub seller_offer_responded_at: Option<DateTime<Utc>>,
    pub buyer_offer_sent_at: Option<DateTime<Utc>>,
    pub buyer_offer_responded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_peer_trade(&self) -> bool {
        self.seller_offer_id.is_some() || matches!(self.status, TradeStatus::AwaitingSeller | TradeStatus::SellerAccepted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: i64,
    pub trade_id: Uuid,
    pub previous_status: Option<TradeStatus>,
    pub new_status: TradeStatus,
    pub actor: Actor,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin,
    User,
}

/// The two ways an admin can close out a `disputed` trade
/// (`POST /admin/trades/:uuid/dispute-resolve`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    Refund,
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pricing_matches_s1_scenario() {
        let pricing = Pricing::compute(dec!(40.00), dec!(5.0));
        assert_eq!(pricing.platform_fee, dec!(2.00));
        assert_eq!(pricing.seller_payout, dec!(38.00));
    }

    #[test]
    fn legal_edges_from_spec() {
        use TradeStatus::*;
        assert!(PendingPayment.can_transition_to(PaymentReceived));
        assert!(PaymentReceived.can_transition_to(AwaitingSeller));
        assert!(PaymentReceived.can_transition_to(AwaitingBuyer));
        assert!(AwaitingSeller.can_transition_to(SellerAccepted));
        assert!(SellerAccepted.can_transition_to(AwaitingBuyer));
        assert!(AwaitingBuyer.can_transition_to(BuyerAccepted));
        assert!(BuyerAccepted.can_transition_to(Completed));
        assert!(AwaitingBuyer.can_transition_to(Disputed));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        use TradeStatus::*;
        assert!(!PendingPayment.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Refunded.can_transition_to(PendingPayment));
    }

    #[test]
    fn terminal_states_are_monotonic() {
        use TradeStatus::*;
        for terminal in [Completed, Cancelled, Refunded, Expired] {
            assert!(terminal.is_terminal());
            for target in [
                PendingPayment,
                PaymentReceived,
                AwaitingSeller,
                SellerAccepted,
                AwaitingBuyer,
                BuyerAccepted,
                Completed,
                Cancelled,
                Refunded,
                Expired,
                Disputed,
            ] {
                if target != terminal {
                    assert!(!terminal.can_transition_to(target), "{:?} -> {:?} must be illegal", terminal, target);
                }
            }
        }
    }
}
