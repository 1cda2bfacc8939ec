//! Offline cache for fetched resources
//!
//! This module provides a cache store that persists resource payloads as one
//! serialized blob with per-entry TTLs. Expired entries are never served:
//! they are removed when read and swept whenever a write pushes the store
//! past its capacity, at which point the oldest-written entries are evicted
//! down to 80% of capacity.

mod entry;
mod store;

pub use entry::{cache_key, CacheEntry, CacheInfo, Cached, CachedLocation, WriteOutcome};
pub use store::{CacheStore, WEATHER_RESOURCE};
