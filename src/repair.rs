//! Batch repair and migration of stored field data
//!
//! Two batch jobs over a record store:
//!
//! - [`repair_double_encryption`] corrects records whose fields were
//!   encrypted more than once (each accidental layer nests the previous
//!   ciphertext as the payload of a new token). Values are peeled until they
//!   no longer classify as ciphertext and written back without
//!   re-encryption.
//! - [`migrate_plaintext`] encrypts legacy unencrypted values in place.
//!
//! Both walk the store in bounded batches and isolate per-record failures:
//! one bad record increments `failed` and the batch continues. Record repair
//! is independent per record, so batches may be parallelized over disjoint
//! ranges as long as the statistics are merged afterwards.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    cipher::FieldCipher, encryptable::FieldAccess, gate::looks_encrypted, store::RecordStore,
};

/// Upper bound on nested decryption attempts per field
pub const MAX_UNWRAP_DEPTH: usize = 5;

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Statistics for a repair run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    pub processed: usize,
    pub fixed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Statistics for a plaintext migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub processed: usize,
    pub encrypted: usize,
    pub failed: usize,
}

/// Peel nested encryption layers off a stored value
///
/// Decrypts repeatedly while the result still classifies as ciphertext,
/// bounded by `max_depth`. Stops early when decryption fails; the deepest
/// value obtained so far is returned rather than an error, so a partially
/// recoverable field keeps its progress.
#[must_use]
pub fn unwrap_layers(cipher: &FieldCipher, value: &str, max_depth: usize) -> String {
    let mut current = value.to_string();

    for attempt in 0..max_depth {
        match cipher.decrypt(&current) {
            Ok(plain) if looks_encrypted(&plain) => {
                // One more layer underneath
                current = plain;
            }
            Ok(plain) => {
                if attempt > 0 {
                    debug!(layers = attempt + 1, "unwrapped nested encryption");
                }
                return plain;
            }
            Err(_) => break,
        }
    }

    current
}

/// Correct records whose fields were encrypted multiple times
///
/// For each record and each named field, nested layers are peeled and the
/// final value is written back through the plain store write path — the
/// repaired value is stored as obtained, never re-wrapped on the way out.
pub fn repair_double_encryption<R, S>(
    store: &mut S,
    cipher: &FieldCipher,
    fields: &[String],
    batch_size: usize,
) -> RepairStats
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
    info!(total, "starting repair of nested encryption");

    let mut stats = RepairStats::default();
    let mut offset = 0;

    while offset < total {
        for (id, mut record) in store.load_batch(offset, batch_size) {
            stats.processed += 1;

            let mut changed = false;
            for name in fields {
                let Some(stored) = record.field(name) else {
                    continue;
                };
                if stored.is_empty() {
                    continue;
                }

                let repaired = unwrap_layers(cipher, &stored, MAX_UNWRAP_DEPTH);
                if repaired != stored {
                    record.set_field_raw(name, repaired);
                    changed = true;
                }
            }

            if !changed {
                stats.skipped += 1;
                continue;
            }

            match store.persist(id, &record) {
                Ok(()) => stats.fixed += 1,
                Err(e) => {
                    error!(id, error = %e, "failed to persist repaired record");
                    stats.failed += 1;
                }
            }
        }
        offset += batch_size;
    }

    info!(
        processed = stats.processed,
        fixed = stats.fixed,
        skipped = stats.skipped,
        failed = stats.failed,
        "repair finished"
    );
    stats
}

/// Encrypt legacy plaintext values of the named fields in place
///
/// Records whose named fields are all empty or already sealed are counted as
/// processed only. A failure on any field leaves the record unwritten and
/// increments `failed`.
pub fn migrate_plaintext<R, S>(
    store: &mut S,
    cipher: &FieldCipher,
    fields: &[String],
    batch_size: usize,
) -> MigrationStats
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
    info!(total, "starting plaintext migration");

    let mut stats = MigrationStats::default();
    let mut offset = 0;

    while offset < total {
        for (id, mut record) in store.load_batch(offset, batch_size) {
            stats.processed += 1;

            let mut changed = false;
            let mut record_failed = false;
            for name in fields {
                let Some(stored) = record.field(name) else {
                    continue;
                };
                if stored.is_empty() || looks_encrypted(&stored) {
                    continue;
                }

                match cipher.encrypt(&stored) {
                    Ok(token) => {
                        record.set_field_raw(name, token);
                        changed = true;
                    }
                    Err(e) => {
                        error!(id, field = %name, error = %e, "failed to encrypt field");
                        record_failed = true;
                        break;
                    }
                }
            }

            if record_failed {
                stats.failed += 1;
                continue;
            }
            if !changed {
                continue;
            }

            match store.persist(id, &record) {
                Ok(()) => stats.encrypted += 1,
                Err(e) => {
                    error!(id, error = %e, "failed to persist migrated record");
                    stats.failed += 1;
                }
            }
        }
        offset += batch_size;
    }

    info!(
        processed = stats.processed,
        encrypted = stats.encrypted,
        failed = stats.failed,
        "migration finished"
    );
    stats
}
