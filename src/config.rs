//! Encryption configuration
//!
//! A single secret string, read once at process start from the application's
//! config file or the `ENCRYPTION_KEY` environment variable.
//!
//! # Example Configuration
//!
//! ```yaml
//! encryption:
//!   secret: {{ get_env(name="ENCRYPTION_KEY") }}
//! ```
//!
//! When no secret is configured the well-known development default is used.
//! That default is deliberately detectable: [`EncryptionConfig::is_configured`]
//! returns `false` for it, and `fieldseal validate` reports it as a setup
//! problem. It must never reach production.

use serde::{Deserialize, Serialize};

use crate::errors::{EncryptionError, EncryptionResult};

/// Environment variable holding the encryption secret.
pub const ENV_VAR: &str = "ENCRYPTION_KEY";

/// Insecure fallback secret used when nothing is configured.
///
/// Publicly known; treated as the "not configured" state.
pub const DEFAULT_SECRET: &str = "default-key-change-this-in-production";

/// Encryption configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncryptionConfig {
    /// Secret passphrase the symmetric key is derived from.
    /// Generate with: `fieldseal keygen`
    pub secret: String,
}

impl EncryptionConfig {
    /// Create a configuration from an explicit secret
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Read the secret from `ENCRYPTION_KEY`, falling back to the insecure
    /// development default when the variable is unset or blank
    #[must_use]
    pub fn from_env() -> Self {
        let secret = std::env::var(ENV_VAR)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SECRET.to_string());
        Self { secret }
    }

    /// Whether a real secret has been configured
    ///
    /// `false` when the secret is blank or still the well-known default.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.secret.trim().is_empty() && self.secret != DEFAULT_SECRET
    }

    /// Reject blank or default secrets
    ///
    /// For callers that must not run against the fallback secret, such as
    /// migrations that write new ciphertext.
    ///
    /// # Errors
    /// Returns `NotConfigured` when no real secret is set
    pub fn ensure_configured(&self) -> EncryptionResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(EncryptionError::NotConfigured(format!(
                "set a real {ENV_VAR} (generate one with `fieldseal keygen`)"
            )))
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
        }
    }
}
