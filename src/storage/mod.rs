//! Persistent string-keyed storage
//!
//! The cache and the network monitor persist their state as serialized text
//! records in a synchronous, size-limited key-value store local to the device.
//! Two backends are provided: an in-memory store (tests, ephemeral sessions)
//! and a directory of JSON files (the CLI).

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::fmt::Debug;
use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would take the store past its byte quota
    #[error("storage quota exceeded: {required} bytes needed, {quota} allowed")]
    QuotaExceeded { required: usize, quota: usize },

    /// Underlying I/O failure
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A synchronous string-keyed store of text records
pub trait KeyValueStore: Send + Sync + Debug {
    /// Reads the record stored under `key`, if any
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the record stored under `key`
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the record stored under `key`; deleting a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Checks a pending write against an optional quota.
///
/// `others` is the total size of every record except the one being replaced.
fn check_quota(quota: Option<usize>, others: usize, incoming: usize) -> Result<(), StorageError> {
    match quota {
        Some(quota) if others + incoming > quota => Err(StorageError::QuotaExceeded {
            required: others + incoming,
            quota,
        }),
        _ => Ok(()),
    }
}
