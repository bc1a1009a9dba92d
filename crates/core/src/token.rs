use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Errors raised while loading a token secret.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenSecretError {
    /// The configured secret is not valid hex.
    #[error("token secret is not valid hex: {0}")]
    InvalidHex(String),

    /// The configured secret is too short.
    #[error("token secret must be at least {min} bytes, got {actual}")]
    TooShort {
        /// Required minimum.
        min: usize,
        /// Decoded length.
        actual: usize,
    },
}

/// Derives download tokens.
///
/// A token is an HMAC-SHA256 over the record code, the issuance instant and a
/// random nonce, keyed with a server secret. Tokens are opaque to callers and
/// only compared for equality against the value stored on the record.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer from raw secret bytes.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Create a signer with a fresh random 32-byte secret.
    ///
    /// Issued tokens stay valid after a restart because they are stored with
    /// their record and only compared for equality. Only new tokens come
    /// from the new secret.
    pub fn random() -> Self {
        let mut secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self { secret }
    }

    /// Parse a hex-encoded secret.
    pub fn from_hex(hex_secret: &str) -> Result<Self, TokenSecretError> {
        let secret = hex::decode(hex_secret.trim())
            .map_err(|e| TokenSecretError::InvalidHex(e.to_string()))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenSecretError::TooShort {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self { secret })
    }

    /// Issue a token bound to `code` and `issued_at`.
    pub fn issue(&self, code: &str, issued_at: DateTime<Utc>) -> String {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        self.sign(code, issued_at, &nonce)
    }

    fn sign(&self, code: &str, issued_at: DateTime<Utc>, nonce: &[u8]) -> String {
        // Length-prefix the code so no code/timestamp pair can collide with another.
        let stamp = issued_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| issued_at.timestamp_micros());
        let msg = format!("{}:{}\n{}\n", code.len(), code, stamp);

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(msg.as_bytes());
        mac.update(nonce);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[test]
    fn token_is_64_hex_chars() {
        let token = signer().issue("Ab3dE6gH", Utc::now());
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn same_inputs_still_yield_distinct_tokens() {
        let now = Utc::now();
        let s = signer();
        assert_ne!(s.issue("Ab3dE6gH", now), s.issue("Ab3dE6gH", now));
    }

    #[test]
    fn signature_binds_code_and_instant() {
        let s = signer();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        let nonce = [7u8; 16];

        let base = s.sign("code", t0, &nonce);
        assert_eq!(base, s.sign("code", t0, &nonce));
        assert_ne!(base, s.sign("code", t1, &nonce));
        assert_ne!(base, s.sign("codf", t0, &nonce));
    }

    #[test]
    fn different_secrets_diverge() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let nonce = [1u8; 16];
        let other = TokenSigner::new(b"fedcba9876543210fedcba9876543210".to_vec());
        assert_ne!(signer().sign("c", t0, &nonce), other.sign("c", t0, &nonce));
    }

    #[test]
    fn from_hex_validates_input() {
        assert!(TokenSigner::from_hex(&"ab".repeat(32)).is_ok());
        assert!(matches!(
            TokenSigner::from_hex("zz"),
            Err(TokenSecretError::InvalidHex(_))
        ));
        assert_eq!(
            TokenSigner::from_hex("abcd").unwrap_err(),
            TokenSecretError::TooShort { min: 16, actual: 2 }
        );
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains("0123456789"));
    }
}
