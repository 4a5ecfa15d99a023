//! Key derivation
//!
//! Turns the configured secret passphrase into a fixed 256-bit symmetric key
//! using PBKDF2-HMAC-SHA256. The salt is derived from the secret itself
//! (first 16 bytes of its SHA-256 digest), so derivation is idempotent
//! without persisting a separate salt. Token uniqueness comes from the
//! cipher's per-call nonce, not from the KDF salt.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 100_000;

/// Derived salt length in bytes
pub const SALT_SIZE: usize = 16;

/// A derived 256-bit symmetric key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("SecretKey(..)")
    }
}

/// Derive the symmetric key from a secret passphrase
///
/// Deterministic: the same secret always yields the same key. An empty
/// secret still derives a key; rejecting empty secrets is the caller's
/// responsibility (see `EncryptionConfig::is_configured`).
#[must_use]
pub fn derive_key(secret: &str) -> SecretKey {
    let salt = derive_salt(secret);

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), &salt, KDF_ITERATIONS, &mut key);
    SecretKey(key)
}

/// Deterministic per-secret salt: first 16 bytes of SHA-256(secret)
fn derive_salt(secret: &str) -> [u8; SALT_SIZE] {
    let digest = Sha256::digest(secret.as_bytes());
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&digest[..SALT_SIZE]);
    salt
}

/// Generate a new random secret suitable for `ENCRYPTION_KEY`
///
/// 32 random bytes, URL-safe base64 encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rng().fill(&mut bytes);
    URL_SAFE.encode(bytes)
}
