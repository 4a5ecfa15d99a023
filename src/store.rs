//! Storage seam
//!
//! Persistence itself belongs to the surrounding application; this module
//! defines the narrow interface the encryption layer consumes, the persist
//! flow that ties encryption to it, and an in-memory implementation used by
//! tests and the CLI.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    cipher::FieldCipher,
    encryptable::{Encryptable, FieldAccess},
    errors::EncryptionError,
};

/// Errors from the persist flow
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Minimal record storage interface
///
/// Batch access is offset/limit based so large tables can be walked with
/// bounded memory.
pub trait RecordStore<R> {
    /// Total number of records
    fn count(&self) -> usize;

    /// Load one record by id
    fn load(&self, id: u64) -> Option<R>;

    /// Load a batch of `(id, record)` pairs
    fn load_batch(&self, offset: usize, limit: usize) -> Vec<(u64, R)>;

    /// Insert a new record, returning its id
    ///
    /// # Errors
    /// Returns an error if the backend rejects the write
    fn insert(&mut self, record: &R) -> Result<u64, StoreError>;

    /// Write a record back as-is
    ///
    /// # Errors
    /// Returns an error if the record does not exist or the backend rejects
    /// the write
    fn persist(&mut self, id: u64, record: &R) -> Result<(), StoreError>;
}

/// Insert a record with its declared fields encrypted
///
/// # Errors
/// An encryption failure aborts the insert; nothing is written
pub fn insert_encrypted<R, S>(
    store: &mut S,
    record: &mut R,
    cipher: &FieldCipher,
) -> Result<u64, StoreError>
where
    R: Encryptable,
    S: RecordStore<R>,
{
    record.encrypt_changed_fields(cipher)?;
    let id = store.insert(record)?;
    record.snapshot_fields();
    Ok(id)
}

/// Persist a record with its declared fields encrypted
///
/// Encrypts changed fields, writes the record, then refreshes the snapshot
/// so a repeated save without modification does not re-encrypt.
///
/// # Errors
/// An encryption failure aborts the persist; nothing is written
pub fn save_encrypted<R, S>(
    store: &mut S,
    id: u64,
    record: &mut R,
    cipher: &FieldCipher,
) -> Result<(), StoreError>
where
    R: Encryptable,
    S: RecordStore<R>,
{
    record.encrypt_changed_fields(cipher)?;
    store.persist(id, record)?;
    record.snapshot_fields();
    Ok(())
}

/// Load a record and capture its field snapshot
pub fn load_tracked<R, S>(store: &S, id: u64) -> Option<R>
where
    R: Encryptable,
    S: RecordStore<R>,
{
    let mut record = store.load(id)?;
    record.refresh();
    Some(record)
}

/// In-memory record store
///
/// Record ids are vector indices.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore<R> {
    records: Vec<R>,
}

impl<R: Clone> MemoryStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_records(records: Vec<R>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}

impl<R: Clone> RecordStore<R> for MemoryStore<R> {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn load(&self, id: u64) -> Option<R> {
        self.records.get(id as usize).cloned()
    }

    fn load_batch(&self, offset: usize, limit: usize) -> Vec<(u64, R)> {
        self.records
            .iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(i, r)| (i as u64, r.clone()))
            .collect()
    }

    fn insert(&mut self, record: &R) -> Result<u64, StoreError> {
        self.records.push(record.clone());
        Ok((self.records.len() - 1) as u64)
    }

    fn persist(&mut self, id: u64, record: &R) -> Result<(), StoreError> {
        let slot = self
            .records
            .get_mut(id as usize)
            .ok_or(StoreError::NotFound(id))?;
        *slot = record.clone();
        Ok(())
    }
}

/// A record with runtime-determined fields, backed by a JSON object
///
/// Lets the CLI run repair and migration over arbitrary JSON exports. Only
/// string-valued fields participate in encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRecord(pub Map<String, Value>);

impl FieldAccess for JsonRecord {
    fn field(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(Value::as_str).map(str::to_string)
    }

    fn set_field_raw(&mut self, name: &str, value: String) {
        self.0.insert(name.to_string(), Value::String(value));
    }
}
