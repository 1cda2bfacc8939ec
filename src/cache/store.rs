//! TTL- and size-bounded cache over a single persisted blob
//!
//! All entries live in one JSON object stored under a fixed storage key.
//! Every mutation reads the whole blob, changes it and writes it back.
//! Expired entries are dropped lazily when read and swept on writes;
//! nothing scans the cache in the background.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::entry::{cache_key, CacheEntry, CacheInfo, Cached, CachedLocation, WriteOutcome};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::network::NetworkMonitor;
use crate::storage::{KeyValueStore, StorageError};

/// Resource type under which weather snapshots are cached
pub const WEATHER_RESOURCE: &str = "weather";

type Blob = HashMap<String, CacheEntry>;

/// Why the blob could not be written
#[derive(Debug, Error)]
enum PersistError {
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Durable, size- and time-bounded key-value cache
#[derive(Debug)]
pub struct CacheStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    network: Arc<NetworkMonitor>,
    config: CacheConfig,
    /// Serializes every read and read-modify-write of the blob; background
    /// refreshes write from other worker threads
    blob_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        network: Arc<NetworkMonitor>,
        config: CacheConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            network,
            config,
            blob_lock: Mutex::new(()),
        }
    }

    /// Maximum number of entries kept once a write's cleanup has run
    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    /// Entry count an eviction sweep trims down to: 80% of capacity,
    /// rounded up to a whole entry
    pub fn low_water_mark(&self) -> usize {
        let max = self.config.max_entries;
        max - max / 5
    }

    /// Writes `data` under `(resource_type, identifier)`.
    ///
    /// A `ttl` of `None` or zero uses the configured default. Persistence
    /// failures never surface as errors: the write is retried once after an
    /// eviction pass and otherwise abandoned, which the outcome reports.
    pub fn set<T: Serialize>(
        &self,
        resource_type: &str,
        identifier: &str,
        data: &T,
        ttl: Option<Duration>,
    ) -> WriteOutcome {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                warn!(resource_type, identifier, %error, "Failed to serialize cache payload");
                return WriteOutcome::Dropped {
                    reason: error.to_string(),
                };
            }
        };

        let ttl = ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or_else(|| self.config.default_ttl());
        let now = self.clock.now();
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let _guard = self.lock();
        let mut blob = self.load();
        blob.insert(
            cache_key(resource_type, identifier),
            CacheEntry {
                data,
                cached_at: now,
                expires_at,
                resource_type: resource_type.to_string(),
                identifier: identifier.to_string(),
            },
        );

        if blob.len() > self.config.max_entries {
            let removed = self.sweep(&mut blob);
            debug!(removed, remaining = blob.len(), "Cache over capacity, evicted entries");
        }

        self.persist(&mut blob)
    }

    /// Reads a live entry, deleting it first if it has expired
    pub fn get<T: DeserializeOwned>(&self, resource_type: &str, identifier: &str) -> Option<Cached<T>> {
        let key = cache_key(resource_type, identifier);
        let _guard = self.lock();
        let mut blob = self.load();

        let Some(entry) = blob.get(&key) else {
            debug!(%key, "Cache miss");
            return None;
        };

        if entry.is_expired_at(self.clock.now()) {
            debug!(%key, expires_at = %entry.expires_at, "Cache entry expired");
            blob.remove(&key);
            self.persist(&mut blob);
            return None;
        }

        match serde_json::from_value(entry.data.clone()) {
            Ok(data) => {
                debug!(%key, "Cache hit");
                Some(Cached {
                    data,
                    cached_at: entry.cached_at,
                    expires_at: entry.expires_at,
                })
            }
            Err(error) => {
                warn!(%key, %error, "Cached payload does not match requested type");
                None
            }
        }
    }

    /// Deletes one entry; removing a missing entry is a no-op
    pub fn remove(&self, resource_type: &str, identifier: &str) {
        let _guard = self.lock();
        let mut blob = self.load();
        if blob.remove(&cache_key(resource_type, identifier)).is_some() {
            self.persist(&mut blob);
        }
    }

    /// Drops the whole persisted cache
    pub fn clear(&self) {
        let _guard = self.lock();
        if let Err(error) = self.storage.remove_item(&self.config.cache_key) {
            warn!(%error, "Failed to clear cache");
        }
    }

    /// Sweeps expired entries, then evicts oldest-written entries down to
    /// the low-water mark. Returns how many entries were removed.
    pub fn cleanup(&self) -> usize {
        let _guard = self.lock();
        let mut blob = self.load();
        let removed = self.sweep(&mut blob);
        if removed > 0 {
            self.persist(&mut blob);
        }
        removed
    }

    pub fn info(&self) -> CacheInfo {
        let _guard = self.lock();
        let blob = self.load();
        let now = self.clock.now();
        let valid_entries = blob.values().filter(|entry| entry.expires_at > now).count();

        CacheInfo {
            total_entries: blob.len(),
            valid_entries,
            expired_entries: blob.len() - valid_entries,
            storage_bytes: self.storage_bytes(),
            is_online: self.network.is_online(),
            network_status: self.network.status(),
        }
    }

    /// Cached weather locations, most recently written first
    pub fn cached_locations(&self) -> Vec<CachedLocation> {
        let _guard = self.lock();
        let mut locations: Vec<CachedLocation> = self
            .load()
            .into_values()
            .filter(|entry| entry.resource_type == WEATHER_RESOURCE)
            .map(|entry| {
                let location_name = entry
                    .data
                    .pointer("/location/name")
                    .and_then(|name| name.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Location {}", entry.identifier));
                CachedLocation {
                    identifier: entry.identifier,
                    cached_at: entry.cached_at,
                    expires_at: entry.expires_at,
                    location_name,
                }
            })
            .collect();

        locations.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        locations
    }

    /// Two-phase sweep over an in-memory blob. Eviction order is `cached_at`
    /// ascending; read recency plays no part.
    fn sweep(&self, blob: &mut Blob) -> usize {
        let now = self.clock.now();
        let before = blob.len();

        blob.retain(|_, entry| entry.expires_at >= now);

        let low_water = self.low_water_mark();
        if blob.len() > low_water {
            let mut by_age: Vec<(DateTime<Utc>, String)> = blob
                .iter()
                .map(|(key, entry)| (entry.cached_at, key.clone()))
                .collect();
            by_age.sort();

            let excess = blob.len() - low_water;
            for (_, key) in by_age.into_iter().take(excess) {
                blob.remove(&key);
            }
        }

        before - blob.len()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.blob_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads the blob; an unreadable or corrupt blob is treated as empty
    fn load(&self) -> Blob {
        let raw = match self.storage.get_item(&self.config.cache_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Blob::new(),
            Err(error) => {
                warn!(%error, "Failed to load cache");
                return Blob::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!(%error, "Cache blob is corrupt, treating as empty");
            Blob::new()
        })
    }

    fn write(&self, blob: &Blob) -> Result<(), PersistError> {
        let json = serde_json::to_string(blob)?;
        self.storage.set_item(&self.config.cache_key, &json)?;
        Ok(())
    }

    /// Writes the blob, with one eviction-and-retry cycle on failure
    fn persist(&self, blob: &mut Blob) -> WriteOutcome {
        let first = match self.write(blob) {
            Ok(()) => return WriteOutcome::Stored,
            Err(error) => error,
        };
        warn!(error = %first, "Failed to save cache, evicting and retrying");

        let evicted = self.sweep(blob);
        match self.write(blob) {
            Ok(()) => WriteOutcome::StoredAfterEviction { evicted },
            Err(error) => {
                warn!(%error, evicted, "Failed to save cache after cleanup, write abandoned");
                WriteOutcome::Dropped {
                    reason: error.to_string(),
                }
            }
        }
    }

    fn storage_bytes(&self) -> usize {
        match self.storage.get_item(&self.config.cache_key) {
            Ok(raw) => raw.map_or(0, |raw| raw.len()),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStorage;
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        temperature: i32,
        condition: String,
    }

    fn snapshot(temperature: i32) -> Snapshot {
        Snapshot {
            temperature,
            condition: "sunny".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 6, 30, 0).unwrap()
    }

    struct Fixture {
        store: CacheStore,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(storage: Arc<dyn KeyValueStore>, max_entries: usize) -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let network = Arc::new(NetworkMonitor::new(
            Arc::new(MemoryStorage::new()),
            clock.clone(),
            "status",
            true,
        ));
        let config = CacheConfig {
            max_entries,
            ..CacheConfig::default()
        };
        let store = CacheStore::new(storage.clone(), clock.clone(), network, config);
        Fixture {
            store,
            storage,
            clock,
        }
    }

    fn fixture(max_entries: usize) -> Fixture {
        fixture_with(Arc::new(MemoryStorage::new()), max_entries)
    }

    /// Backend whose writes always fail, as a full store would
    #[derive(Debug, Default)]
    struct FullStorage {
        inner: MemoryStorage,
    }

    impl KeyValueStore for FullStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_item(key)
        }

        fn set_item(&self, _key: &str, value: &str) -> Result<(), StorageError> {
            Err(StorageError::QuotaExceeded {
                required: value.len(),
                quota: 0,
            })
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn test_set_then_get_returns_data_with_metadata() {
        let f = fixture(50);

        let outcome = f.store.set("weather", "1", &snapshot(72), None);
        let cached: Cached<Snapshot> = f.store.get("weather", "1").expect("should hit");

        assert_eq!(outcome, WriteOutcome::Stored);
        assert_eq!(cached.data, snapshot(72));
        assert_eq!(cached.cached_at, t0());
        assert_eq!(cached.expires_at, t0() + ChronoDuration::hours(24));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let f = fixture(50);
        assert!(f.store.get::<Snapshot>("weather", "missing").is_none());
    }

    #[test]
    fn test_custom_ttl_sets_expiry() {
        let f = fixture(50);

        f.store
            .set("weather", "1", &snapshot(60), Some(Duration::from_secs(600)));

        let cached: Cached<Snapshot> = f.store.get("weather", "1").unwrap();
        assert_eq!(cached.expires_at, t0() + ChronoDuration::minutes(10));
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let f = fixture(50);

        f.store.set("weather", "1", &snapshot(60), Some(Duration::ZERO));

        let cached: Cached<Snapshot> = f.store.get("weather", "1").unwrap();
        assert!(cached.expires_at > cached.cached_at);
        assert_eq!(cached.expires_at, t0() + ChronoDuration::hours(24));
    }

    #[test]
    fn test_get_after_expiry_returns_none_and_removes_entry() {
        let f = fixture(50);
        f.store
            .set("weather", "1", &snapshot(60), Some(Duration::from_secs(60)));
        // Reads before expiry do not extend the lifetime
        assert!(f.store.get::<Snapshot>("weather", "1").is_some());

        f.clock.advance(ChronoDuration::seconds(61));

        assert!(f.store.get::<Snapshot>("weather", "1").is_none());
        assert_eq!(f.store.info().total_entries, 0);
    }

    #[test]
    fn test_entry_is_served_exactly_at_expiry() {
        let f = fixture(50);
        f.store
            .set("weather", "1", &snapshot(60), Some(Duration::from_secs(60)));

        f.clock.advance(ChronoDuration::seconds(60));

        assert!(f.store.get::<Snapshot>("weather", "1").is_some());
    }

    #[test]
    fn test_overwrite_replaces_payload() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(1), None);
        f.clock.advance(ChronoDuration::minutes(1));
        f.store.set("weather", "1", &snapshot(2), None);

        let cached: Cached<Snapshot> = f.store.get("weather", "1").unwrap();

        assert_eq!(cached.data, snapshot(2));
        assert_eq!(cached.cached_at, t0() + ChronoDuration::minutes(1));
        assert_eq!(f.store.info().total_entries, 1);
    }

    #[test]
    fn test_resource_types_do_not_collide() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(1), None);
        f.store.set("insights", "1", &json!({"summary": "calm"}), None);

        assert_eq!(f.store.get::<Snapshot>("weather", "1").unwrap().data, snapshot(1));
        assert_eq!(
            f.store.get::<serde_json::Value>("insights", "1").unwrap().data["summary"],
            "calm"
        );
    }

    #[test]
    fn test_callers_receive_independent_copies() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(70), None);

        let mut first: Cached<Snapshot> = f.store.get("weather", "1").unwrap();
        first.data.temperature = -40;

        let second: Cached<Snapshot> = f.store.get("weather", "1").unwrap();
        assert_eq!(second.data.temperature, 70);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(1), None);

        f.store.remove("weather", "1");
        f.store.remove("weather", "1");

        assert!(f.store.get::<Snapshot>("weather", "1").is_none());
    }

    #[test]
    fn test_clear_drops_blob() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(1), None);
        f.store.set("weather", "2", &snapshot(2), None);

        f.store.clear();

        assert!(f.storage.get_item("hypercast_offline_cache").unwrap().is_none());
        assert_eq!(f.store.info().total_entries, 0);
    }

    #[test]
    fn test_three_writes_into_two_slots_evict_oldest() {
        let f = fixture(2);

        f.store.set("weather", "A", &snapshot(1), None);
        f.clock.advance(ChronoDuration::seconds(1));
        f.store.set("weather", "B", &snapshot(2), None);
        f.clock.advance(ChronoDuration::seconds(1));
        f.store.set("weather", "C", &snapshot(3), None);

        assert!(f.store.get::<Snapshot>("weather", "A").is_none());
        assert!(f.store.get::<Snapshot>("weather", "B").is_some());
        assert!(f.store.get::<Snapshot>("weather", "C").is_some());
    }

    #[test]
    fn test_size_bound_holds_after_every_write() {
        let f = fixture(10);

        for i in 0..35 {
            f.store.set("weather", &i.to_string(), &snapshot(i), None);
            f.clock.advance(ChronoDuration::seconds(1));
            assert!(f.store.info().total_entries <= 10);
        }
    }

    #[test]
    fn test_eviction_removes_oldest_written_down_to_low_water_mark() {
        let f = fixture(10);
        // Written out of identifier order to make sure age, not key, decides
        for (i, id) in ["e", "a", "j", "c", "h", "b", "i", "d", "g", "f"].iter().enumerate() {
            f.clock.set(t0() + ChronoDuration::seconds(i as i64));
            f.store.set("weather", id, &snapshot(i as i32), None);
        }
        // Reading the oldest entry does not protect it
        assert!(f.store.get::<Snapshot>("weather", "e").is_some());

        f.clock.set(t0() + ChronoDuration::seconds(10));
        f.store.set("weather", "k", &snapshot(10), None);

        assert_eq!(f.store.low_water_mark(), 8);
        assert_eq!(f.store.info().total_entries, 8);
        for evicted in ["e", "a", "j"] {
            assert!(f.store.get::<Snapshot>("weather", evicted).is_none(), "{evicted}");
        }
        for kept in ["c", "h", "b", "i", "d", "g", "f", "k"] {
            assert!(f.store.get::<Snapshot>("weather", kept).is_some(), "{kept}");
        }
    }

    #[test]
    fn test_low_water_mark_rounds_up() {
        assert_eq!(fixture(1).store.low_water_mark(), 1);
        assert_eq!(fixture(2).store.low_water_mark(), 2);
        assert_eq!(fixture(3).store.low_water_mark(), 3);
        assert_eq!(fixture(7).store.low_water_mark(), 6);
        assert_eq!(fixture(50).store.low_water_mark(), 40);
    }

    #[test]
    fn test_cleanup_with_unbounded_capacity() {
        let f = fixture(usize::MAX);
        assert_eq!(f.store.low_water_mark(), usize::MAX - usize::MAX / 5);

        f.store.set("weather", "a", &snapshot(70), None);

        assert_eq!(f.store.cleanup(), 0);
        assert!(f.store.get::<Snapshot>("weather", "a").is_some());
    }

    #[test]
    fn test_cleanup_sweeps_expired_first() {
        let f = fixture(50);
        f.store
            .set("weather", "short", &snapshot(1), Some(Duration::from_secs(60)));
        f.store.set("weather", "long", &snapshot(2), None);
        f.clock.advance(ChronoDuration::minutes(5));

        let removed = f.store.cleanup();

        assert_eq!(removed, 1);
        let info = f.store.info();
        assert_eq!(info.total_entries, 1);
        assert_eq!(info.expired_entries, 0);
    }

    #[test]
    fn test_cleanup_on_clean_store_removes_nothing() {
        let f = fixture(50);
        f.store.set("weather", "1", &snapshot(1), None);

        assert_eq!(f.store.cleanup(), 0);
        assert_eq!(f.store.info().total_entries, 1);
    }

    #[test]
    fn test_info_counts_valid_and_expired() {
        let f = fixture(50);
        f.store
            .set("weather", "1", &snapshot(1), Some(Duration::from_secs(60)));
        f.store.set("weather", "2", &snapshot(2), None);
        f.store.set("weather", "3", &snapshot(3), None);
        f.clock.advance(ChronoDuration::minutes(2));

        let info = f.store.info();

        assert_eq!(info.total_entries, 3);
        assert_eq!(info.valid_entries, 2);
        assert_eq!(info.expired_entries, 1);
        assert!(info.is_online);
        assert!(info.network_status.is_online);
        let raw = f.storage.get_item("hypercast_offline_cache").unwrap().unwrap();
        assert_eq!(info.storage_bytes, raw.len());
    }

    #[test]
    fn test_corrupt_blob_is_treated_as_empty() {
        let f = fixture(50);
        f.storage
            .set_item("hypercast_offline_cache", "{{{ definitely not json")
            .unwrap();

        assert!(f.store.get::<Snapshot>("weather", "1").is_none());
        assert_eq!(f.store.info().total_entries, 0);

        assert_eq!(f.store.set("weather", "1", &snapshot(5), None), WriteOutcome::Stored);
        assert_eq!(f.store.get::<Snapshot>("weather", "1").unwrap().data, snapshot(5));
    }

    #[test]
    fn test_write_retries_after_evicting_expired_entries() {
        let f = fixture_with(Arc::new(MemoryStorage::with_quota(800)), 50);
        let bulky = json!({ "blob": "x".repeat(200) });
        f.store.set("weather", "a", &bulky, Some(Duration::from_secs(1)));
        f.store.set("weather", "b", &bulky, Some(Duration::from_secs(1)));
        f.clock.advance(ChronoDuration::hours(1));

        let outcome = f.store.set("weather", "c", &bulky, None);

        assert_eq!(outcome, WriteOutcome::StoredAfterEviction { evicted: 2 });
        assert!(f.store.get::<serde_json::Value>("weather", "c").is_some());
        assert_eq!(f.store.info().total_entries, 1);
    }

    #[test]
    fn test_write_abandoned_after_second_failure_without_panicking() {
        let f = fixture_with(Arc::new(FullStorage::default()), 50);

        let outcome = f.store.set("weather", "1", &snapshot(1), None);

        assert!(matches!(outcome, WriteOutcome::Dropped { .. }));
        // Reads keep working in degraded mode
        assert!(f.store.get::<Snapshot>("weather", "1").is_none());
        assert_eq!(f.store.cleanup(), 0);
    }

    #[test]
    fn test_payload_type_mismatch_is_a_miss() {
        let f = fixture(50);
        f.store.set("weather", "1", &json!(["not", "a", "snapshot"]), None);

        assert!(f.store.get::<Snapshot>("weather", "1").is_none());
    }

    #[test]
    fn test_cached_locations_lists_weather_newest_first() {
        let f = fixture(50);
        f.store.set(
            "weather",
            "1",
            &json!({"location": {"name": "San Francisco"}}),
            None,
        );
        f.clock.advance(ChronoDuration::minutes(1));
        f.store.set("insights", "1", &json!({"summary": "calm"}), None);
        f.clock.advance(ChronoDuration::minutes(1));
        f.store.set("weather", "2", &json!({"current": {}}), None);

        let locations = f.store.cached_locations();

        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].identifier, "2");
        assert_eq!(locations[0].location_name, "Location 2");
        assert_eq!(locations[1].identifier, "1");
        assert_eq!(locations[1].location_name, "San Francisco");
    }

    #[test]
    fn test_concurrent_writes_are_not_lost() {
        let f = fixture(50);
        let store = &f.store;

        std::thread::scope(|scope| {
            for id in 0..8 {
                scope.spawn(move || {
                    store.set("weather", &id.to_string(), &snapshot(id), None);
                });
            }
        });

        assert_eq!(store.info().total_entries, 8);
        for id in 0..8 {
            assert!(store.get::<Snapshot>("weather", &id.to_string()).is_some());
        }
    }

    #[test]
    fn test_readers_never_see_a_partial_file_blob() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn KeyValueStore> =
            Arc::new(crate::storage::FileStorage::with_dir(dir.path().to_path_buf()));
        let f = fixture_with(storage, 50);
        for id in 0..3 {
            f.store.set("weather", &id.to_string(), &snapshot(id), None);
        }
        let store = &f.store;

        std::thread::scope(|scope| {
            scope.spawn(move || {
                for round in 0..50 {
                    store.set("weather", &(round % 3).to_string(), &snapshot(round), None);
                }
            });
            scope.spawn(move || {
                for _ in 0..50 {
                    assert_eq!(store.info().total_entries, 3);
                    assert_eq!(store.cached_locations().len(), 3);
                }
            });
        });
    }
}
