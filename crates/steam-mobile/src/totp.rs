//! Thin wrapper around `another-steam-totp`, Steam's TOTP/confirmation-key
//! algorithm, with the clock-skew tolerance from spec.md §4.4 ("TOTP
//! generated from the shared secret; clock-skew tolerance ±30 s").

use another_steam_totp::{generate_auth_code, generate_confirmation_key, Tag};

use crate::errors::AuthenticatorError;

/// Allowed clock skew, in seconds, when generating a login code.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 30;

/// Generates the current 5-character Steam Guard login code for `shared_secret`.
pub fn login_code(shared_secret: &str, time_offset: i64) -> Result<String, AuthenticatorError> {
    generate_auth_code(shared_secret, time_offset).map_err(|e| AuthenticatorError::Totp(e.to_string()))
}

/// Generates the confirmation key used to authorize/deny mobile
/// confirmations (trade offers, market listings).
pub fn confirmation_key(identity_secret: &str, time: i64, tag: Tag) -> Result<String, AuthenticatorError> {
    generate_confirmation_key(identity_secret, time, tag).map_err(|e| AuthenticatorError::Totp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `client.rs`'s login retry schedule assumes the code generated `±30s`
    /// away from now differs from the code generated for `now` itself; if
    /// the skew ever fell inside a single TOTP time step the retry would be
    /// pointless (same code resubmitted three times).
    #[test]
    fn clock_skew_offset_changes_the_generated_code() {
        let secret = "AAAAAAAAAAAAAAAAAAAAAAAAAAA=";
        let base = login_code(secret, 0).unwrap();
        let behind = login_code(secret, -CLOCK_SKEW_TOLERANCE_SECS).unwrap();
        let ahead = login_code(secret, CLOCK_SKEW_TOLERANCE_SECS).unwrap();
        assert_ne!(base, behind);
        assert_ne!(base, ahead);
    }
}
