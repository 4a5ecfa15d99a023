//! Encrypted field declarations on record types
//!
//! A record type opts in by embedding a [`FieldState`] value object and
//! implementing two small traits: [`FieldAccess`] (string get/set by field
//! name) and [`Encryptable`] (the declared field list plus state accessors).
//! The provided methods give every such record encrypt-on-save and
//! decrypt-on-read semantics without inheritance:
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct Profile {
//!     phone_number: String,
//!     address: String,
//!     #[serde(skip)]
//!     state: FieldState,
//! }
//!
//! impl FieldAccess for Profile {
//!     fn field(&self, name: &str) -> Option<String> {
//!         match name {
//!             "phone_number" => Some(self.phone_number.clone()),
//!             "address" => Some(self.address.clone()),
//!             _ => None,
//!         }
//!     }
//!
//!     fn set_field_raw(&mut self, name: &str, value: String) {
//!         match name {
//!             "phone_number" => self.phone_number = value,
//!             "address" => self.address = value,
//!             _ => {}
//!         }
//!     }
//! }
//!
//! impl Encryptable for Profile {
//!     fn encrypted_fields() -> &'static [&'static str] {
//!         &["phone_number", "address"]
//!     }
//!     fn field_state(&self) -> &FieldState { &self.state }
//!     fn field_state_mut(&mut self) -> &mut FieldState { &mut self.state }
//! }
//! ```
//!
//! Writes: call `encrypt_changed_fields` before persisting (or go through
//! `store::save_encrypted`, which does). Only fields that are non-empty,
//! changed since the last snapshot, and not already sealed are encrypted; an
//! encryption failure aborts the save. Reads: `decrypted_field` caches the
//! plaintext for the lifetime of the in-memory record and degrades to the
//! stored value when decryption fails, so read paths stay available even
//! with corrupted data.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::{cipher::FieldCipher, errors::EncryptionResult, gate::looks_encrypted};

/// Per-record snapshot and decrypted-value cache
///
/// Belongs to a single in-memory record instance and is not synchronized;
/// records shared across threads need external locking.
#[derive(Debug, Clone, Default)]
pub struct FieldState {
    /// Stored values as of the last load or successful persist
    originals: HashMap<String, String>,

    /// Memo of the last successfully decrypted plaintext per field
    decrypted: HashMap<String, String>,
}

impl FieldState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// String field access by name
pub trait FieldAccess {
    /// Current stored value of a field, `None` if the record has no such field
    fn field(&self, name: &str) -> Option<String>;

    /// Assign a field directly, bypassing cache bookkeeping
    fn set_field_raw(&mut self, name: &str, value: String);
}

/// A record type with a declared set of encrypted fields
pub trait Encryptable: FieldAccess {
    /// Field names subject to encryption
    ///
    /// Identical across all instances of the type and immutable.
    fn encrypted_fields() -> &'static [&'static str];

    fn field_state(&self) -> &FieldState;

    fn field_state_mut(&mut self) -> &mut FieldState;

    /// Snapshot current values of all declared fields
    ///
    /// Call after loading from storage and after every successful persist;
    /// the snapshot is what `encrypt_changed_fields` compares against.
    fn snapshot_fields(&mut self) {
        let mut originals = HashMap::new();
        for name in Self::encrypted_fields() {
            if let Some(value) = self.field(name) {
                originals.insert((*name).to_string(), value);
            }
        }
        self.field_state_mut().originals = originals;
    }

    /// Reload semantics: drop the decrypted cache and re-snapshot
    fn refresh(&mut self) {
        self.field_state_mut().decrypted.clear();
        self.snapshot_fields();
    }

    /// Assign a plaintext value and evict any cached decryption for it
    ///
    /// A subsequent read recomputes rather than returning stale cache.
    fn set_field(&mut self, name: &str, value: String) {
        self.set_field_raw(name, value);
        self.field_state_mut().decrypted.remove(name);
    }

    /// Encrypt every declared field that changed since the last snapshot
    ///
    /// Unchanged, empty, and already-sealed values are left alone, so saving
    /// twice without modification never double-encrypts.
    ///
    /// # Errors
    /// Propagates the first encryption failure; the caller must abort the
    /// persist rather than store plaintext for a declared-sensitive field
    fn encrypt_changed_fields(&mut self, cipher: &FieldCipher) -> EncryptionResult<()> {
        for name in Self::encrypted_fields() {
            let Some(current) = self.field(name) else {
                continue;
            };
            if current.is_empty() {
                continue;
            }
            if self.field_state().originals.get(*name) == Some(&current) {
                continue;
            }
            if looks_encrypted(&current) {
                continue;
            }

            let token = cipher.encrypt(&current).map_err(|e| {
                error!(field = %name, error = %e, "failed to encrypt field");
                e
            })?;
            self.set_field_raw(name, token);
            self.field_state_mut().decrypted.remove(*name);
            debug!(field = %name, "encrypted field");
        }
        Ok(())
    }

    /// Decrypted value of a field, cached per instance
    ///
    /// Fields outside the declared set are returned as stored. Stored values
    /// that do not classify as sealed tokens pass through unchanged (legacy
    /// plaintext). A decryption failure is logged and degrades to the raw
    /// stored value; the result is cached either way.
    fn decrypted_field(&mut self, cipher: &FieldCipher, name: &str) -> String {
        if !Self::encrypted_fields().iter().any(|f| *f == name) {
            return self.field(name).unwrap_or_default();
        }

        if let Some(cached) = self.field_state().decrypted.get(name) {
            return cached.clone();
        }

        let stored = self.field(name).unwrap_or_default();
        if stored.is_empty() {
            return String::new();
        }

        let plaintext = match cipher.decrypt(&stored) {
            Ok(value) => value,
            Err(e) => {
                warn!(field = %name, error = %e, "failed to decrypt field, returning stored value");
                stored
            }
        };

        self.field_state_mut()
            .decrypted
            .insert(name.to_string(), plaintext.clone());
        plaintext
    }

    /// All declared fields, decrypted
    fn decrypted_fields(&mut self, cipher: &FieldCipher) -> HashMap<&'static str, String> {
        Self::encrypted_fields()
            .iter()
            .map(|name| (*name, self.decrypted_field(cipher, name)))
            .collect()
    }
}

/// Encrypt named fields of a JSON object in place
///
/// # Errors
/// Propagates the first encryption failure
pub fn encrypt_map_fields(
    cipher: &FieldCipher,
    record: &mut Map<String, Value>,
    fields: &[String],
) -> EncryptionResult<()> {
    for name in fields {
        let Some(value) = record.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let token = cipher.encrypt_value(value)?;
        record.insert(name.clone(), Value::String(token));
    }
    Ok(())
}

/// Decrypt named fields of a JSON object in place, degrading on failure
///
/// Fields that fail to decrypt keep their stored value and are logged, so a
/// partially corrupted record still comes back readable.
pub fn decrypt_map_fields(cipher: &FieldCipher, record: &mut Map<String, Value>, fields: &[String]) {
    for name in fields {
        let Some(stored) = record.get(name).and_then(Value::as_str) else {
            continue;
        };
        match cipher.decrypt(stored) {
            Ok(plaintext) => {
                record.insert(name.clone(), Value::String(plaintext));
            }
            Err(e) => {
                warn!(field = %name, error = %e, "failed to decrypt field, keeping stored value");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Profile {
        phone_number: String,
        bio: String,
        state: FieldState,
    }

    impl FieldAccess for Profile {
        fn field(&self, name: &str) -> Option<String> {
            match name {
                "phone_number" => Some(self.phone_number.clone()),
                "bio" => Some(self.bio.clone()),
                _ => None,
            }
        }

        fn set_field_raw(&mut self, name: &str, value: String) {
            match name {
                "phone_number" => self.phone_number = value,
                "bio" => self.bio = value,
                _ => {}
            }
        }
    }

    impl Encryptable for Profile {
        fn encrypted_fields() -> &'static [&'static str] {
            &["phone_number", "bio"]
        }

        fn field_state(&self) -> &FieldState {
            &self.state
        }

        fn field_state_mut(&mut self) -> &mut FieldState {
            &mut self.state
        }
    }

    fn test_cipher() -> FieldCipher {
        FieldCipher::from_secret("prod-secret-2024")
    }

    #[test]
    fn test_encrypt_changed_fields_seals_plaintext() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.set_field("phone_number", "+1-555-0100".to_string());

        profile.encrypt_changed_fields(&cipher).unwrap();

        assert!(looks_encrypted(&profile.phone_number));
        assert_eq!(profile.bio, "");
        assert_eq!(
            profile.decrypted_field(&cipher, "phone_number"),
            "+1-555-0100"
        );
    }

    #[test]
    fn test_unchanged_field_is_not_reencrypted() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.set_field("phone_number", "+1-555-0100".to_string());

        profile.encrypt_changed_fields(&cipher).unwrap();
        profile.snapshot_fields();
        let first_token = profile.phone_number.clone();

        // Second save with no changes: stored ciphertext stays byte-identical
        profile.encrypt_changed_fields(&cipher).unwrap();
        assert_eq!(profile.phone_number, first_token);
    }

    #[test]
    fn test_set_field_evicts_cache() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.set_field("phone_number", "+1-555-0100".to_string());
        profile.encrypt_changed_fields(&cipher).unwrap();

        assert_eq!(
            profile.decrypted_field(&cipher, "phone_number"),
            "+1-555-0100"
        );

        profile.set_field("phone_number", "+1-555-0199".to_string());

        // Cache was evicted: the read reflects the new value
        assert_eq!(
            profile.decrypted_field(&cipher, "phone_number"),
            "+1-555-0199"
        );
    }

    #[test]
    fn test_refresh_clears_cache_and_resnapshots() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.set_field("bio", "hiking and jazz".to_string());
        profile.encrypt_changed_fields(&cipher).unwrap();
        let _ = profile.decrypted_field(&cipher, "bio");

        profile.refresh();

        assert!(profile.state.decrypted.is_empty());
        assert_eq!(
            profile.state.originals.get("bio"),
            Some(&profile.bio)
        );
    }

    #[test]
    fn test_decrypt_degrades_on_wrong_key() {
        let mut profile = Profile::default();
        profile.set_field("phone_number", "+1-555-0100".to_string());
        profile
            .encrypt_changed_fields(&test_cipher())
            .unwrap();
        let stored = profile.phone_number.clone();

        // Reading under the wrong key returns the stored token, not an error
        let other = FieldCipher::from_secret("some-other-secret");
        assert_eq!(profile.decrypted_field(&other, "phone_number"), stored);
    }

    #[test]
    fn test_legacy_plaintext_passes_through() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.phone_number = "+1-555-0100".to_string(); // unencrypted legacy row
        profile.snapshot_fields();

        assert_eq!(
            profile.decrypted_field(&cipher, "phone_number"),
            "+1-555-0100"
        );
    }

    #[test]
    fn test_undeclared_field_returned_as_stored() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        assert_eq!(profile.decrypted_field(&cipher, "missing"), "");
    }

    #[test]
    fn test_decrypted_fields_returns_all() {
        let cipher = test_cipher();
        let mut profile = Profile::default();
        profile.set_field("phone_number", "+1-555-0100".to_string());
        profile.set_field("bio", "hiking and jazz".to_string());
        profile.encrypt_changed_fields(&cipher).unwrap();

        let all = profile.decrypted_fields(&cipher);
        assert_eq!(all["phone_number"], "+1-555-0100");
        assert_eq!(all["bio"], "hiking and jazz");
    }

    #[test]
    fn test_map_field_helpers_roundtrip() {
        let cipher = test_cipher();
        let fields = vec!["address".to_string()];

        let mut record = serde_json::json!({"address": "12 Rose Lane", "id": 3})
            .as_object()
            .cloned()
            .unwrap();

        encrypt_map_fields(&cipher, &mut record, &fields).unwrap();
        assert!(looks_encrypted(record["address"].as_str().unwrap()));
        assert_eq!(record["id"], 3);

        decrypt_map_fields(&cipher, &mut record, &fields);
        assert_eq!(record["address"], "12 Rose Lane");
    }
}
