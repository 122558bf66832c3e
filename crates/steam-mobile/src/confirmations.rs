use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMethod {
    Accept,
    Deny,
}

/// A pending Steam Guard mobile confirmation — trade offers are the only
/// kind this orchestrator cares about, but Steam returns market listings too.
#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "id")]
    pub confirmation_id: String,
    #[serde(rename = "nonce")]
    pub confirmation_key: String,
    /// The trade offer id this confirmation authorizes, if it is a trade.
    #[serde(rename = "creator_id")]
    pub creator: i64,
    pub type_name: String,
}

impl Confirmation {
    pub fn is_for_trade_offer(&self, tradeoffer_id: i64) -> bool {
        self.creator == tradeoffer_id
    }
}

pub fn filter_by_trade_offer_ids(confirmations: Vec<Confirmation>, ids: &[i64]) -> Vec<Confirmation> {
    confirmations
        .into_iter()
        .filter(|c| ids.contains(&c.creator))
        .collect()
}
