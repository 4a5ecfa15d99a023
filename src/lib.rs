//! Field-Level Encryption at Rest
//!
//! This crate transparently encrypts selected sensitive record fields
//! (names, phone numbers, addresses) before they reach storage, decrypts
//! them on read, tolerates legacy unencrypted data living in the same
//! columns, and ships a repair tool for data that was accidentally
//! encrypted more than once.
//!
//! # Features
//!
//! - **Automatic encryption on save**: declared fields are sealed by
//!   `save_encrypted` / `insert_encrypted` before the store write
//! - **Explicit decryption on read**: call `decrypted_field()` (Rust idiom);
//!   results are cached per in-memory record
//! - **AEAD security**: AES-256-GCM authenticated encryption; tampering and
//!   wrong keys are detected, never silently decrypted
//! - **Non-deterministic tokens**: a fresh nonce per call, so equal inputs
//!   never produce equal ciphertext
//! - **Legacy tolerance**: unencrypted values pass through reads unchanged;
//!   pre-envelope tokens decrypt via a fallback payload format
//! - **Repair tooling**: batch jobs to unwrap nested encryption and to
//!   migrate plaintext columns
//!
//! # Quick Start
//!
//! 1. Configure a secret (generate one with `fieldseal keygen`):
//!
//! ```bash
//! export ENCRYPTION_KEY="$(fieldseal keygen)"
//! ```
//!
//! 2. Declare encrypted fields on your record type:
//!
//! ```rust
//! use fieldseal::{Encryptable, FieldAccess, FieldCipher, FieldState};
//!
//! #[derive(Default)]
//! struct Profile {
//!     phone_number: String,
//!     address: String,
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
//!     fn field_state(&self) -> &FieldState {
//!         &self.state
//!     }
//!     fn field_state_mut(&mut self) -> &mut FieldState {
//!         &mut self.state
//!     }
//! }
//!
//! let cipher = FieldCipher::from_secret("prod-secret-2024");
//! let mut profile = Profile::default();
//! profile.set_field("phone_number", "+1-555-0100".to_string());
//! profile.encrypt_changed_fields(&cipher).unwrap();
//!
//! assert_ne!(profile.phone_number, "+1-555-0100"); // sealed
//! assert_eq!(profile.decrypted_field(&cipher, "phone_number"), "+1-555-0100");
//! ```
//!
//! 3. Persist through the store seam so snapshots stay correct:
//!
//! ```rust,ignore
//! let id = store::insert_encrypted(&mut store, &mut profile, &cipher)?;
//! // ... later
//! let mut loaded = store::load_tracked(&store, id).ok_or(...)?;
//! println!("{}", loaded.decrypted_field(&cipher, "phone_number"));
//! ```
//!
//! # Token Format
//!
//! A sealed token is `base64( nonce || AES-256-GCM(envelope JSON) )`, where
//! the envelope carries the value, its logical type, and the encryption
//! time:
//!
//! ```json
//! {"data":"+1-555-0100","type":"string","encrypted_at":"2024-05-01T12:00:00Z"}
//! ```
//!
//! The envelope and base64 overhead make tokens much longer than their
//! source values; size text columns for encrypted fields at 500+ characters
//! for short inputs.
//!
//! The symmetric key is derived once from the configured secret with
//! PBKDF2-HMAC-SHA256 (100k iterations; deterministic salt from the secret
//! itself, so the same secret always yields the same key). Derivation costs
//! tens of milliseconds: derive once at startup and share the
//! [`FieldCipher`], which is immutable and thread-safe.
//!
//! # Security Considerations
//!
//! - **Never commit secrets to version control**; supply `ENCRYPTION_KEY`
//!   through the environment
//! - The built-in default secret is publicly known and exists only so
//!   `fieldseal validate` can tell you it is not configured
//! - Ciphertext detection is a length + base64 heuristic; see [`gate`] for
//!   the documented misclassification risk

pub mod cipher;
pub mod config;
pub mod diagnostics;
pub mod encryptable;
pub mod envelope;
pub mod errors;
pub mod gate;
pub mod kdf;
pub mod repair;
pub mod store;

// Re-export main types for convenience
pub use cipher::{FieldCipher, NONCE_SIZE, TAG_SIZE};
pub use config::{EncryptionConfig, DEFAULT_SECRET, ENV_VAR};
pub use diagnostics::{audit_records, validate_setup, AuditReport, SetupReport};
pub use encryptable::{
    decrypt_map_fields, encrypt_map_fields, Encryptable, FieldAccess, FieldState,
};
pub use envelope::{Envelope, Payload, ValueKind};
pub use errors::{EncryptionError, EncryptionResult};
pub use gate::{looks_encrypted, MIN_TOKEN_LEN};
pub use kdf::{derive_key, generate_secret, SecretKey, KDF_ITERATIONS, KEY_SIZE};
pub use repair::{
    migrate_plaintext, repair_double_encryption, unwrap_layers, MigrationStats, RepairStats,
    DEFAULT_BATCH_SIZE, MAX_UNWRAP_DEPTH,
};
pub use store::{
    insert_encrypted, load_tracked, save_encrypted, JsonRecord, MemoryStore, RecordStore,
    StoreError,
};
