//! Setup validation and stored-data auditing
//!
//! `validate_setup` answers "is encryption actually working here": whether a
//! real secret is configured, and whether a fixed sample survives an
//! encrypt/decrypt round trip. `audit_records` sweeps stored records for
//! fields that fail to decrypt or still look like ciphertext after
//! decryption (the signature of nested encryption).

use serde::Serialize;
use tracing::warn;

use crate::{
    cipher::FieldCipher,
    config::EncryptionConfig,
    encryptable::FieldAccess,
    gate::{looks_encrypted, MIN_TOKEN_LEN},
    repair::DEFAULT_BATCH_SIZE,
    store::RecordStore,
};

/// Fixed sample used by the round-trip self-test
pub const ROUNDTRIP_SAMPLE: &str = "Test Data 123";

/// Decrypted values longer than this are flagged as possibly still encrypted
pub const SUSPECT_VALUE_LEN: usize = 500;

/// Result of `validate_setup`
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    /// A real (non-default) secret is configured
    pub encryption_enabled: bool,

    /// Some secret is present, even if it is the insecure default
    pub key_configured: bool,

    /// The encrypt/decrypt self-test reproduced the sample exactly
    pub roundtrip_ok: bool,

    /// Human-readable setup advice
    pub recommendations: Vec<String>,
}

/// Encrypt and decrypt a fixed sample, checking equality
#[must_use]
pub fn roundtrip_check(cipher: &FieldCipher) -> bool {
    match cipher
        .encrypt(ROUNDTRIP_SAMPLE)
        .and_then(|token| cipher.decrypt(&token))
    {
        Ok(plain) => plain == ROUNDTRIP_SAMPLE,
        Err(e) => {
            warn!(error = %e, "roundtrip self-test failed");
            false
        }
    }
}

/// Validate the encryption configuration
#[must_use]
pub fn validate_setup(config: &EncryptionConfig) -> SetupReport {
    let cipher = FieldCipher::from_config(config);

    let encryption_enabled = config.is_configured();
    let key_configured = !config.secret.trim().is_empty();
    let roundtrip_ok = roundtrip_check(&cipher);

    let mut recommendations = Vec::new();
    if !encryption_enabled {
        recommendations.push(
            "Set a secure ENCRYPTION_KEY instead of the built-in default (generate one with `fieldseal keygen`)".to_string(),
        );
    }
    if !roundtrip_ok {
        recommendations
            .push("Encryption roundtrip test failed - check your configuration".to_string());
    }
    recommendations.push(format!(
        "Ciphertext detection is heuristic: base64-shaped plaintext of {MIN_TOKEN_LEN}+ characters is skipped on encrypt. A version-prefixed token format would make detection exact."
    ));

    SetupReport {
        encryption_enabled,
        key_configured,
        roundtrip_ok,
        recommendations,
    }
}

/// One suspicious field found by `audit_records`
#[derive(Debug, Clone, Serialize)]
pub struct AuditFinding {
    pub record_id: u64,
    pub field: String,
    pub reason: String,
}

/// Result of `audit_records`
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    /// Records examined
    pub checked: usize,

    /// Records with at least one suspicious field
    pub flagged: usize,

    pub findings: Vec<AuditFinding>,
}

/// Sweep stored records for fields in a suspicious state
///
/// Flags fields that fail to decrypt, still classify as ciphertext after
/// decryption (nested encryption), or decrypt to implausibly long values.
pub fn audit_records<R, S>(
    store: &S,
    cipher: &FieldCipher,
    fields: &[String],
    batch_size: usize,
) -> AuditReport
where
    R: FieldAccess,
    S: RecordStore<R>,
{
    let batch_size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };
    let total = store.count();

    let mut report = AuditReport::default();
    let mut offset = 0;

    while offset < total {
        for (id, record) in store.load_batch(offset, batch_size) {
            report.checked += 1;

            let mut record_flagged = false;
            for name in fields {
                let Some(stored) = record.field(name) else {
                    continue;
                };
                if stored.is_empty() {
                    continue;
                }

                let reason = match cipher.decrypt(&stored) {
                    Err(e) => Some(format!("decryption failed: {e}")),
                    Ok(plain) if looks_encrypted(&plain) => {
                        Some("still looks encrypted after decryption".to_string())
                    }
                    Ok(plain) if plain.len() > SUSPECT_VALUE_LEN => {
                        Some(format!("suspiciously long value ({} chars)", plain.len()))
                    }
                    Ok(_) => None,
                };

                if let Some(reason) = reason {
                    record_flagged = true;
                    report.findings.push(AuditFinding {
                        record_id: id,
                        field: name.clone(),
                        reason,
                    });
                }
            }

            if record_flagged {
                report.flagged += 1;
            }
        }
        offset += batch_size;
    }

    report
}
