use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A Steam inventory item as snapshotted at listing/trade creation time.
///
/// Denormalized onto both `Listing` and `Trade` so a trade remains auditable
/// even if the underlying listing is later edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub asset_id: String,
    pub market_hash_name: String,
    pub app_id: u32,
    pub context_id: String,
    pub icon_url: String,
    pub rarity: Option<String>,
    pub exterior: Option<String>,
    pub float_value: Option<String>,
    pub sticker_set: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    /// A bot already custodies the item; no seller-side leg is needed.
    BotOwned,
    /// The seller holds the item; the bot must request it first.
    Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Reserved,
    Sold,
    Cancelled,
    Removed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub seller_steam_id: u64,
    pub item: ItemSnapshot,
    pub price: Decimal,
    pub currency: String,
    pub kind: ListingKind,
    pub status: ListingStatus,
    pub views: i64,
    pub is_featured: bool,
    /// Required when `kind == Peer`; the seller's receiving trade url.
    pub seller_delivery_trade_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_purchasable(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// Validates the peer-listing precondition from spec.md §3: "For `peer`
    /// listings the seller's delivery address is required."
    pub fn validate_invariants(&self) -> Result<(), &'static str> {
        if self.price <= Decimal::ZERO {
            return Err("listing price must be > 0");
        }
        if self.kind == ListingKind::Peer && self.seller_delivery_trade_url.is_none() {
            return Err("peer listings require a seller delivery trade url");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_item() -> ItemSnapshot {
        ItemSnapshot {
            asset_id: "123".into(),
            market_hash_name: "AK-47 | Redline".into(),
            app_id: 730,
            context_id: "2".into(),
            icon_url: "icon".into(),
            rarity: Some("Classified".into()),
            exterior: Some("Field-Tested".into()),
            float_value: Some("0.21".into()),
            sticker_set: vec![],
        }
    }

    #[test]
    fn peer_listing_without_address_is_invalid() {
        let listing = Listing {
            id: 1,
            seller_steam_id: 1,
            item: sample_item(),
            price: dec!(10.00),
            currency: "USD".into(),
            kind: ListingKind::Peer,
            status: ListingStatus::Active,
            views: 0,
            is_featured: false,
            seller_delivery_trade_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(listing.validate_invariants().is_err());
    }

    #[test]
    fn bot_owned_listing_without_address_is_valid() {
        let listing = Listing {
            id: 1,
            seller_steam_id: 1,
            item: sample_item(),
            price: dec!(10.00),
            currency: "USD".into(),
            kind: ListingKind::BotOwned,
            status: ListingStatus::Active,
            views: 0,
            is_featured: false,
            seller_delivery_trade_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(listing.validate_invariants().is_ok());
        assert!(listing.is_purchasable());
    }
}
