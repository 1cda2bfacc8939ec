//! Process-wide state, built once at startup
//!
//! `Context` owns the storage backend, the clock, the network monitor and
//! the cache store, and hands shared references to the data access layer.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::gateway::WeatherGateway;
use crate::network::NetworkMonitor;
use crate::policy::DataAccess;
use crate::storage::{KeyValueStore, MemoryStorage};

#[derive(Debug)]
pub struct Context {
    config: Config,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    network: Arc<NetworkMonitor>,
    cache: Arc<CacheStore>,
}

impl Context {
    /// Wires the monitor and cache over `storage`.
    ///
    /// `initially_online` is the host's reachability at startup.
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        initially_online: bool,
    ) -> Self {
        let network = Arc::new(NetworkMonitor::new(
            storage.clone(),
            clock.clone(),
            config.cache.network_key.clone(),
            initially_online,
        ));
        let cache = Arc::new(CacheStore::new(
            storage.clone(),
            clock.clone(),
            network.clone(),
            config.cache.clone(),
        ));

        Self {
            config,
            storage,
            clock,
            network,
            cache,
        }
    }

    /// A context over in-memory storage and the system clock
    pub fn in_memory(config: Config, initially_online: bool) -> Self {
        let storage: Arc<dyn KeyValueStore> = match config.cache.quota_bytes {
            Some(quota) => Arc::new(MemoryStorage::with_quota(quota)),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::new(config, storage, Arc::new(SystemClock), initially_online)
    }

    /// Data access over this context's cache and monitor
    pub fn data_access(&self, gateway: Arc<dyn WeatherGateway>) -> DataAccess {
        DataAccess::new(self.cache.clone(), self.network.clone(), gateway)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockWeatherGateway;
    use crate::policy::{FetchOptions, Provenance};

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.gateway.latency_ms = 0;
        config
    }

    #[test]
    fn test_context_uses_configured_keys() {
        let context = Context::in_memory(quick_config(), true);

        assert!(context
            .storage()
            .get_item(&context.config().cache.network_key)
            .unwrap()
            .is_some());

        context.cache().set("weather", "1", &1, None);
        assert!(context
            .storage()
            .get_item(&context.config().cache.cache_key)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_cache_info_reflects_monitor() {
        let context = Context::in_memory(quick_config(), false);

        let info = context.cache().info();

        assert!(!info.is_online);
        assert!(!info.network_status.is_online);
    }

    #[tokio::test]
    async fn test_data_access_shares_cache_with_context() {
        let context = Context::in_memory(quick_config(), true);
        let gateway = Arc::new(MockWeatherGateway::new(&context.config().gateway));
        let access = context.data_access(gateway);

        let fetched = access.get_weather("4", FetchOptions::default()).await.unwrap();

        assert_eq!(fetched.provenance, Provenance::Fresh);
        assert_eq!(context.cache().cached_locations()[0].location_name, "Tokyo");
    }
}
