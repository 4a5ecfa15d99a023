//! Ciphertext classification heuristic
//!
//! Decides whether a stored string is already a sealed token (so it must not
//! be encrypted again) or plaintext/legacy data (passed through unchanged).
//!
//! This is a heuristic, not a proof: any base64-decodable string of at least
//! [`MIN_TOKEN_LEN`] characters classifies as encrypted. Real tokens always
//! pass (the envelope plus nonce and auth tag put even a one-character value
//! well past the threshold), but long base64-shaped plaintext is
//! misclassified and silently skipped on encrypt. `validate` surfaces this
//! limitation; a version-prefixed token format would make classification
//! exact and is the recommended future improvement.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Minimum length of a sealed token
///
/// Envelope JSON plus nonce and authentication tag overhead means genuine
/// ciphertext is always longer than this.
pub const MIN_TOKEN_LEN: usize = 50;

/// Check whether a stored value looks like a sealed token
#[must_use]
pub fn looks_encrypted(value: &str) -> bool {
    if value.len() < MIN_TOKEN_LEN {
        return false;
    }
    BASE64.decode(value).is_ok()
}
