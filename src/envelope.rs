//! Sealed token payload format
//!
//! The payload protected by the cipher is a small JSON envelope carrying the
//! original value, its logical type name, and the time of encryption:
//!
//! ```json
//! {"data":"Jane Doe","type":"string","encrypted_at":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Decryption can encounter two historical payload formats, modeled as an
//! explicit tagged union ([`Payload`]): the current envelope, and the legacy
//! pre-envelope format where the plaintext bytes were encrypted directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EncryptionError, EncryptionResult};

/// Logical type of the value a token was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Object,
    Array,
    Number,
    Boolean,
    Null,
}

impl ValueKind {
    /// Classify a JSON value
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
        }
    }
}

/// Envelope wrapped around a value before encryption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The original value, serialized to a string
    pub data: String,

    /// Logical type name of the original value
    #[serde(rename = "type")]
    pub kind: ValueKind,

    /// Time of encryption (UTC, ISO-8601)
    pub encrypted_at: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope stamped with the current time
    #[must_use]
    pub fn new(data: String, kind: ValueKind) -> Self {
        Self {
            data,
            kind,
            encrypted_at: Utc::now(),
        }
    }

    /// Serialize to compact JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> EncryptionResult<String> {
        serde_json::to_string(self).map_err(EncryptionError::from)
    }
}

/// Decrypted payload, dispatched by detected format
#[derive(Debug, Clone)]
pub enum Payload {
    /// Current format: JSON envelope with value, type, and timestamp
    Envelope(Envelope),

    /// Pre-envelope format: the plaintext bytes were encrypted directly
    Legacy(String),
}

impl Payload {
    /// Detect the payload format of decrypted bytes
    ///
    /// Bytes that parse as an envelope are the current format; anything else
    /// is legacy plaintext and is returned as-is (lossily decoded if not
    /// valid UTF-8).
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if let Ok(envelope) = serde_json::from_str::<Envelope>(text) {
                return Self::Envelope(envelope);
            }
            return Self::Legacy(text.to_string());
        }
        Self::Legacy(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Extract the original value string
    #[must_use]
    pub fn into_data(self) -> String {
        match self {
            Self::Envelope(envelope) => envelope.data,
            Self::Legacy(raw) => raw,
        }
    }
}
