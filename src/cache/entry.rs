//! Cache records and the read-side views handed to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::NetworkStatus;

/// Builds the composite storage key for a resource
pub fn cache_key(resource_type: &str, identifier: &str) -> String {
    format!("{}_{}", resource_type, identifier)
}

/// One persisted cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Opaque application payload
    pub data: Value,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being served; always later than `cached_at`
    pub expires_at: DateTime<Utc>,
    /// Resource kind half of the composite key (e.g. "weather")
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Identifier half of the composite key (e.g. a location id)
    pub identifier: String,
}

impl CacheEntry {
    /// Whether the entry is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A cache hit: an owned copy of the payload plus its staleness metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a cache write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Persisted on the first attempt
    Stored,
    /// Persisted on retry after an eviction pass removed `evicted` entries
    StoredAfterEviction { evicted: usize },
    /// Abandoned; the store keeps serving what it already had
    Dropped { reason: String },
}

impl WriteOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, WriteOutcome::Dropped { .. })
    }
}

/// Diagnostic snapshot of the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Serialized size of the persisted blob
    pub storage_bytes: usize,
    pub is_online: bool,
    pub network_status: NetworkStatus,
}

/// A cached weather location, as listed for offline browsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLocation {
    pub identifier: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub location_name: String,
}
