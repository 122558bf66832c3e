use serde::{Deserialize, Serialize};

/// A partner's trade link — the partner id plus the token that lets a bot
/// send them an offer without being on their friends list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tradelink {
    pub partner_steam_id: u64,
    pub token: Option<String>,
}

/// A single Steam inventory asset reference, as required to build or
/// interpret a trade offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub app_id: u32,
    pub context_id: String,
    pub asset_id: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetCollection(pub Vec<Asset>);

impl AssetCollection {
    pub fn single(asset: Asset) -> Self {
        Self(vec![asset])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything needed to send one trade offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOffer {
    pub their_tradelink: Tradelink,
    pub my_assets: AssetCollection,
    pub their_assets: AssetCollection,
    pub message: Option<String>,
}

impl TradeOffer {
    /// The only validation the Steam client itself is responsible for: an
    /// offer must move at least one item. Price/listing validation belongs
    /// to the trade engine, not this layer.
    pub fn validate(my_assets: &AssetCollection, their_assets: &AssetCollection) -> Result<(), crate::errors::TradeError> {
        if my_assets.is_empty() && their_assets.is_empty() {
            return Err(crate::errors::TradeError::EmptyOffer);
        }
        Ok(())
    }
}

/// Offer state as observed by polling (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferState {
    Active,
    Accepted,
    Declined,
    Cancelled,
    Expired,
    Invalid,
}

impl OfferState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OfferState::Active)
    }
}
