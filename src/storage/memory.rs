//! In-memory storage backend

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{check_quota, KeyValueStore, StorageError};

/// Keeps records in a process-local map
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Creates an unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory store that rejects writes past `quota` bytes in total
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let others: usize = items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();
        check_quota(self.quota, others, value.len())?;

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_value() {
        let storage = MemoryStorage::new();

        storage.set_item("status", "{\"isOnline\":true}").unwrap();

        assert_eq!(
            storage.get_item("status").unwrap().as_deref(),
            Some("{\"isOnline\":true}")
        );
    }

    #[test]
    fn test_get_missing_key_returns_none() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("nothing").unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.set_item("k", "v").unwrap();

        storage.remove_item("k").unwrap();
        storage.remove_item("k").unwrap();

        assert!(storage.get_item("k").unwrap().is_none());
    }

    #[test]
    fn test_quota_rejects_oversized_write_and_keeps_old_value() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("k", "12345").unwrap();

        let result = storage.set_item("k", "12345678901");

        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn test_quota_replacing_a_record_does_not_count_it_twice() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("k", "1234567890").unwrap();

        assert!(storage.set_item("k", "0987654321").is_ok());
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("0987654321"));
    }
}
