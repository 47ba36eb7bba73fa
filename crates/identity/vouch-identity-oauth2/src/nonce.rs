//! Random state nonces for CSRF protection of the authorization redirect.

use crate::error::{OAuth2Error, OAuth2Result};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use rand::RngCore;
use rand::rngs::OsRng;

/// Bytes of OS entropy behind every nonce.
pub const NONCE_ENTROPY_BYTES: usize = 32;

/// Generate a fresh, unpredictable, alphanumeric-only token.
///
/// The entropy is base64 encoded and every non-alphanumeric character is
/// stripped so the value is safe in URLs and cookies. Failure to read from
/// the OS RNG is returned, never papered over.
pub fn generate_state_nonce() -> OAuth2Result<String> {
    let mut bytes = [0u8; NONCE_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OAuth2Error::Randomness(e.to_string()))?;

    Ok(URL_SAFE
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nonce_is_alphanumeric() {
        let nonce = generate_state_nonce().unwrap();
        assert!(!nonce.is_empty());
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
        // 32 bytes encode to 44 base64 characters, minus stripped symbols and padding
        assert!(nonce.len() >= 30 && nonce.len() <= 43);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_state_nonce().unwrap()));
        }
    }
}
