//! Encryption at rest for `bots.encrypted_password` / `encrypted_totp_secret`
//! / `encrypted_identity_secret` (spec.md §3 "Bot": "Secrets are stored
//! encrypted at rest").
//!
//! None of the pack's example repos needed encryption at rest, so this
//! reaches outside the teacher for a crate that does the job directly
//! (DESIGN.md). AES-256-GCM, one random 96-bit nonce per seal, prepended to
//! the ciphertext the way `aes-gcm`'s own examples lay it out.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use escrow_types::EscrowError;

const NONCE_LEN: usize = 12;

/// Holds the application's master key and seals/opens individual secret
/// strings with it. The key itself never touches the database; only
/// `SecretBox::seal`'s output does.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
    }

    /// Parses a 32-byte key from a hex string (`escrow-config`'s
    /// `Secrets::bot_secret_key`).
    pub fn from_hex_key(hex_key: &str) -> Result<Self, EscrowError> {
        let bytes = hex::decode(hex_key).map_err(|e| EscrowError::Internal(format!("malformed bot secret key: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EscrowError::Internal("bot secret key must be 32 bytes".into()))?;
        Ok(Self::new(&key))
    }

    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>, EscrowError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| EscrowError::Internal(format!("secret encryption failed: {e}")))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<String, EscrowError> {
        if sealed.len() < NONCE_LEN {
            return Err(EscrowError::Internal("sealed secret shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(nonce_bytes.into(), ciphertext)
            .map_err(|e| EscrowError::Internal(format!("secret decryption failed: {e}")))?;
        String::from_utf8(plaintext).map_err(|e| EscrowError::Internal(format!("decrypted secret was not utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let key = [7u8; 32];
        let boxed = SecretBox::new(&key);
        let sealed = boxed.seal("totp-shared-secret").unwrap();
        assert_ne!(sealed, b"totp-shared-secret".to_vec());
        assert_eq!(boxed.open(&sealed).unwrap(), "totp-shared-secret");
    }

    #[test]
    fn distinct_seals_use_distinct_nonces() {
        let key = [3u8; 32];
        let boxed = SecretBox::new(&key);
        let a = boxed.seal("same-plaintext").unwrap();
        let b = boxed.seal("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = SecretBox::new(&[1u8; 32]).seal("secret").unwrap();
        assert!(SecretBox::new(&[2u8; 32]).open(&sealed).is_err());
    }
}
