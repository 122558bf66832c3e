use steam_mobile::AuthenticatorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("no matching trade offer found")]
    NoMatch,
    #[error("steam returned an unrecognized response: {0}")]
    GeneralFailure(String),
}

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("a trade offer must move at least one item")]
    EmptyOffer,

    #[error("authenticator error: {0}")]
    Authenticator(#[from] AuthenticatorError),

    #[error(transparent)]
    Offer(#[from] OfferError),

    #[error("steam rejected the request, not retriable: {0}")]
    Persistent(String),

    #[error("transient steam/network failure, retriable: {0}")]
    Transient(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TradeError {
    /// The retry predicate from spec.md §4.2: retries transient errors
    /// (ECONNRESET, 429, 502/503/504) but not 401/403/422.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TradeError::Transient(_) | TradeError::Network(_))
    }

    pub fn from_status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        match status.as_u16() {
            401 | 403 | 422 => TradeError::Persistent(format!("status {status}: {body}")),
            429 | 502 | 503 | 504 => TradeError::Transient(format!("status {status}: {body}")),
            _ if status.is_server_error() => TradeError::Transient(format!("status {status}: {body}")),
            _ => TradeError::Persistent(format!("status {status}: {body}")),
        }
    }
}
