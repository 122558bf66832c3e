use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthenticatorError {
    #[error("steam rejected the supplied credentials")]
    InvalidCredentials,

    #[error("steam guard mobile confirmation required but could not be completed")]
    SteamGuardRequired,

    #[error("cached session is missing or expired, a fresh login is required")]
    SessionExpired,

    #[error("failed to generate a totp/confirmation code: {0}")]
    Totp(String),

    #[error("no confirmation found matching the requested trade offer(s)")]
    ConfirmationNotFound,

    #[error("network error talking to steam: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to parse a steam response: {0}")]
    Parse(String),
}
