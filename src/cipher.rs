//! AES-256-GCM sealing and opening of field values
//!
//! Each encryption wraps the value in a JSON envelope (value, type,
//! timestamp), seals it with AES-256-GCM under a fresh random nonce, and
//! base64-encodes `nonce || ciphertext+tag` for storage in a text column.
//! Encryption is non-deterministic: the same input never yields the same
//! token twice.
//!
//! The cipher is constructed once with an explicit key and passed to
//! whatever layer needs it; there is no global key lookup. It holds no
//! mutable state and is safe to share across threads.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::EncryptionConfig,
    envelope::{Envelope, Payload, ValueKind},
    errors::{EncryptionError, EncryptionResult},
    gate::looks_encrypted,
    kdf::{derive_key, SecretKey},
};

/// AES-GCM nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Sealing/opening service for field values
#[derive(Clone)]
pub struct FieldCipher {
    key: SecretKey,
}

impl FieldCipher {
    /// Create a cipher from an already-derived key
    #[must_use]
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// Derive the key from a secret passphrase and create a cipher
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        Self::new(derive_key(secret))
    }

    /// Create a cipher from configuration
    #[must_use]
    pub fn from_config(config: &EncryptionConfig) -> Self {
        Self::from_secret(&config.secret)
    }

    /// Encrypt a string value into a sealed token
    ///
    /// Empty and whitespace-only input maps to an empty token. Values that
    /// already classify as sealed tokens are returned unchanged, so repeated
    /// encryption is idempotent.
    ///
    /// # Errors
    /// Returns an error if envelope serialization or the cipher fails
    pub fn encrypt(&self, plaintext: &str) -> EncryptionResult<String> {
        if plaintext.trim().is_empty() {
            return Ok(String::new());
        }

        if looks_encrypted(plaintext) {
            debug!("value already looks encrypted, skipping encryption");
            return Ok(plaintext.to_string());
        }

        self.seal_envelope(plaintext.to_string(), ValueKind::String)
    }

    /// Encrypt a JSON value into a sealed token
    ///
    /// Non-string values are serialized to compact JSON first; only
    /// JSON-representable shapes survive the round trip exactly. `null`
    /// maps to an empty token.
    ///
    /// # Errors
    /// Returns an error if serialization or the cipher fails
    pub fn encrypt_value(&self, value: &Value) -> EncryptionResult<String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => self.encrypt(s),
            other => {
                let data = serde_json::to_string(other)?;
                self.seal_envelope(data, ValueKind::of(other))
            }
        }
    }

    /// Decrypt a sealed token back to the original string
    ///
    /// An empty token decrypts to the empty string. Values that do not
    /// classify as sealed tokens are returned as-is (legacy unencrypted data
    /// coexists with ciphertext in the same columns). Envelope payloads
    /// yield their `data` field; pre-envelope payloads yield the raw
    /// decrypted bytes.
    ///
    /// # Errors
    /// Returns `DecryptionFailed` when authentication fails (wrong key,
    /// corrupted or tampered token) and `InvalidFormat` for truncated tokens
    pub fn decrypt(&self, token: &str) -> EncryptionResult<String> {
        if token.trim().is_empty() {
            return Ok(String::new());
        }

        if !looks_encrypted(token) {
            debug!("value does not look encrypted, returning as-is");
            return Ok(token.to_string());
        }

        let plaintext = self.open(token)?;
        Ok(Payload::detect(&plaintext).into_data())
    }

    /// Wrap a serialized value in an envelope and seal it
    fn seal_envelope(&self, data: String, kind: ValueKind) -> EncryptionResult<String> {
        let payload = Envelope::new(data, kind).to_json()?;
        self.seal(payload.as_bytes())
    }

    /// Seal raw payload bytes: `base64(nonce || ciphertext+tag)`
    ///
    /// Crate-internal: unconditional sealing is how nested encryption is
    /// reproduced in the repair tests.
    pub(crate) fn seal(&self, payload: &[u8]) -> EncryptionResult<String> {
        let cipher = Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(token))
    }

    /// Open a sealed token into its payload bytes
    fn open(&self, token: &str) -> EncryptionResult<Vec<u8>> {
        let bytes = BASE64.decode(token)?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(EncryptionError::InvalidFormat(format!(
                "token too short: {} bytes",
                bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|e| EncryptionError::InvalidKey(e.to_string()))?;

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher.decrypt(nonce, ciphertext).map_err(|_| {
            EncryptionError::DecryptionFailed(
                "authentication failed (wrong key or tampered token)".to_string(),
            )
        })
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FieldCipher {
        FieldCipher::from_secret("prod-secret-2024")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "Jane Doe";

        let token = cipher.encrypt(plaintext).unwrap();
        assert!(token.len() > crate::gate::MIN_TOKEN_LEN);
        assert!(looks_encrypted(&token));

        let decrypted = cipher.decrypt(&token).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_is_non_deterministic() {
        let cipher = test_cipher();
        let plaintext = "Same input";

        let token1 = cipher.encrypt(plaintext).unwrap();
        let token2 = cipher.encrypt(plaintext).unwrap();

        // Different nonces should produce different tokens
        assert_ne!(token1, token2);

        // But both should decrypt to the same plaintext
        assert_eq!(cipher.decrypt(&token1).unwrap(), plaintext);
        assert_eq!(cipher.decrypt(&token2).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let cipher1 = FieldCipher::from_secret("secret-one");
        let cipher2 = FieldCipher::from_secret("secret-two");

        let token = cipher1.encrypt("Secret data").unwrap();

        assert!(matches!(
            cipher2.decrypt(&token),
            Err(EncryptionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_empty_input_passthrough() {
        let cipher = test_cipher();

        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.encrypt("   ").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_unicode_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "Hello, \u{4e16}\u{754c}! \u{1f600}";

        let token = cipher.encrypt(plaintext).unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_is_idempotent_on_tokens() {
        let cipher = test_cipher();

        let token = cipher.encrypt("+1-555-0100").unwrap();
        let again = cipher.encrypt(&token).unwrap();

        // Already-sealed values pass through unchanged
        assert_eq!(token, again);
    }

    #[test]
    fn test_decrypt_passthrough_for_plaintext() {
        let cipher = test_cipher();

        // Legacy unencrypted column values are returned as-is
        assert_eq!(cipher.decrypt("Jane Doe").unwrap(), "Jane Doe");
    }

    #[test]
    fn test_tampered_token_fails() {
        let cipher = test_cipher();
        let token = cipher.encrypt("Secret").unwrap();

        let mut bytes = BASE64.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(&bytes);

        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(EncryptionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_garbage_token_fails() {
        let cipher = test_cipher();

        // Classifies as a token but was never produced by the cipher
        let garbage = BASE64.encode([7u8; 40]);
        assert!(looks_encrypted(&garbage));
        assert!(matches!(
            cipher.decrypt(&garbage),
            Err(EncryptionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_encrypt_value_structured_roundtrip() {
        let cipher = test_cipher();
        let value = serde_json::json!({"city": "Lisbon", "zip": "1100"});

        let token = cipher.encrypt_value(&value).unwrap();
        let decrypted = cipher.decrypt(&token).unwrap();

        // Structured values round-trip through compact JSON
        assert_eq!(decrypted, r#"{"city":"Lisbon","zip":"1100"}"#);
    }

    #[test]
    fn test_encrypt_value_null_is_empty() {
        let cipher = test_cipher();
        assert_eq!(cipher.encrypt_value(&serde_json::Value::Null).unwrap(), "");
    }

    #[test]
    fn test_legacy_payload_fallback() {
        let cipher = test_cipher();

        // A token sealed before the envelope format existed
        let legacy_token = cipher.seal(b"raw legacy value").unwrap();
        assert_eq!(cipher.decrypt(&legacy_token).unwrap(), "raw legacy value");
    }

    #[test]
    fn test_empty_secret_still_roundtrips() {
        let cipher = FieldCipher::from_secret("");
        let token = cipher.encrypt("configured elsewhere").unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), "configured elsewhere");
    }
}
