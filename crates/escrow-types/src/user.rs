use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A platform user, identified by their 17-digit Steam community id.
///
/// Invariant: `available() == balance - reserved >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub steam_id: u64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Where items are sent back to this user when they sell a `peer` listing.
    pub delivery_trade_url: Option<String>,
    pub balance: Decimal,
    pub reserved: Decimal,
    pub risk_score: i32,
    pub flagged_for_review: bool,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }

    pub fn is_invariant_satisfied(&self) -> bool {
        self.balance >= Decimal::ZERO && self.reserved <= self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_user() -> User {
        User {
            steam_id: 76561198000000000,
            display_name: "buyer".into(),
            avatar_url: None,
            delivery_trade_url: None,
            balance: dec!(100.00),
            reserved: dec!(40.00),
            risk_score: 0,
            flagged_for_review: false,
            banned: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_subtracts_reserved() {
        let user = sample_user();
        assert_eq!(user.available(), dec!(60.00));
        assert!(user.is_invariant_satisfied());
    }

    #[test]
    fn invariant_fails_when_overreserved() {
        let mut user = sample_user();
        user.reserved = dec!(150.00);
        assert!(!user.is_invariant_satisfied());
    }
}
