//! Per-request data access policy
//!
//! Decides, for each request, whether to serve from cache, fetch fresh,
//! refresh in the background, or fail. The decision depends only on the
//! connectivity flag, whether the cache has a live entry, and the request
//! options, evaluated in this order:
//!
//! 1. Offline with cache allowed: serve the cached entry (`Offline`) or fail
//!    with `NoCachedData`.
//! 2. Online, cache allowed, no forced refresh: serve a cached entry
//!    immediately (`FromCache`) and refresh it in the background. A miss
//!    falls through.
//! 3. Fetch: on success write through and return `Fresh`; on failure fall
//!    back to a cached entry (`FallbackToCache`) or return the fetch error.
//!
//! Identical requests issued back to back are not coalesced; each one
//! decides and fetches on its own.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Cached, WEATHER_RESOURCE};
use crate::data::{DailyForecast, Forecast, HourlyForecast, WeatherSnapshot};
use crate::gateway::{GatewayError, WeatherGateway};
use crate::network::NetworkMonitor;
use crate::refresh::{BackgroundRefresh, RefreshMessage};

/// Default number of hours returned by `hourly_forecast`
pub const DEFAULT_FORECAST_HOURS: usize = 48;

/// Default number of days returned by `daily_forecast`
pub const DEFAULT_FORECAST_DAYS: usize = 10;

/// Errors that reach the caller of a data request
#[derive(Debug, Error)]
pub enum DataError {
    /// Offline and nothing usable in the cache
    #[error("No cached data available for {resource_type} {identifier} while offline")]
    NoCachedData {
        resource_type: String,
        identifier: String,
    },

    /// The fetch failed and there was no cached entry to fall back on
    #[error("Failed to fetch data: {0}")]
    FetchFailed(#[from] GatewayError),
}

/// Per-request options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Read from and write to the cache
    pub use_cache: bool,
    /// Skip a valid cache entry and fetch (only meaningful while online)
    pub force_refresh: bool,
    /// TTL for the entry written on success; `None` uses the cache default
    pub ttl: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
            ttl: None,
        }
    }
}

impl FetchOptions {
    /// Cache allowed, but fetch even when a valid entry exists
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    /// Bypass the cache entirely
    pub fn no_cache() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Where a returned payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Served from cache because the device is offline
    Offline,
    /// Served from a valid cache entry while online
    FromCache,
    /// Fetched just now
    Fresh,
    /// The fetch failed; served from cache instead
    FallbackToCache,
}

impl Provenance {
    /// Status indicator text for this source
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Offline => "Offline",
            Provenance::FromCache => "Cached",
            Provenance::Fresh => "Live",
            Provenance::FallbackToCache => "Network Issue",
        }
    }

    /// The provenance as mutually exclusive boolean flags
    pub fn flags(&self) -> ProvenanceFlags {
        ProvenanceFlags {
            offline: *self == Provenance::Offline,
            from_cache: *self == Provenance::FromCache,
            fresh: *self == Provenance::Fresh,
            fallback_to_cache: *self == Provenance::FallbackToCache,
        }
    }
}

/// Boolean provenance tags, exactly one of which is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceFlags {
    pub offline: bool,
    pub from_cache: bool,
    pub fresh: bool,
    pub fallback_to_cache: bool,
}

/// A successfully served payload with its provenance
#[derive(Debug)]
pub struct Fetched<T> {
    pub data: T,
    pub provenance: Provenance,
    /// Write time of the cache entry served, if the data came from cache
    pub cached_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// The fetch error behind a `FallbackToCache` result
    pub error: Option<String>,
    /// Background refresh started for a `FromCache` result
    pub refresh: Option<BackgroundRefresh>,
}

impl<T> Fetched<T> {
    fn fresh(data: T) -> Self {
        Self {
            data,
            provenance: Provenance::Fresh,
            cached_at: None,
            expires_at: None,
            error: None,
            refresh: None,
        }
    }

    fn cached(cached: Cached<T>, provenance: Provenance) -> Self {
        Self {
            data: cached.data,
            provenance,
            cached_at: Some(cached.cached_at),
            expires_at: Some(cached.expires_at),
            error: None,
            refresh: None,
        }
    }

    pub fn flags(&self) -> ProvenanceFlags {
        self.provenance.flags()
    }

    /// Transforms the payload, keeping provenance and metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            provenance: self.provenance,
            cached_at: self.cached_at,
            expires_at: self.expires_at,
            error: self.error,
            refresh: self.refresh,
        }
    }
}

/// Orchestrates cache, connectivity and the weather gateway per request
pub struct DataAccess {
    cache: Arc<CacheStore>,
    network: Arc<NetworkMonitor>,
    gateway: Arc<dyn WeatherGateway>,
    notifier: Option<mpsc::Sender<RefreshMessage>>,
}

impl DataAccess {
    pub fn new(
        cache: Arc<CacheStore>,
        network: Arc<NetworkMonitor>,
        gateway: Arc<dyn WeatherGateway>,
    ) -> Self {
        Self {
            cache,
            network,
            gateway,
            notifier: None,
        }
    }

    /// Reports background refresh outcomes on `notifier`
    pub fn with_notifier(mut self, notifier: mpsc::Sender<RefreshMessage>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Serves `(resource_type, identifier)` according to the policy,
    /// calling `fetch` at most once (in the foreground or in the background).
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        resource_type: &str,
        identifier: &str,
        options: FetchOptions,
        fetch: F,
    ) -> Result<Fetched<T>, DataError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let online = self.network.is_online();

        if !online && options.use_cache {
            return match self.cache.get::<T>(resource_type, identifier) {
                Some(cached) => {
                    info!(resource_type, identifier, "Offline, serving cached data");
                    Ok(Fetched::cached(cached, Provenance::Offline))
                }
                None => {
                    warn!(resource_type, identifier, "Offline with no cached data");
                    Err(DataError::NoCachedData {
                        resource_type: resource_type.to_string(),
                        identifier: identifier.to_string(),
                    })
                }
            };
        }

        if online && options.use_cache && !options.force_refresh {
            if let Some(cached) = self.cache.get::<T>(resource_type, identifier) {
                debug!(resource_type, identifier, "Serving cached data, refreshing in background");
                let refresh = BackgroundRefresh::spawn(
                    self.cache.clone(),
                    resource_type.to_string(),
                    identifier.to_string(),
                    options.ttl,
                    fetch(),
                    self.notifier.clone(),
                );
                let mut fetched = Fetched::cached(cached, Provenance::FromCache);
                fetched.refresh = Some(refresh);
                return Ok(fetched);
            }
        }

        match fetch().await {
            Ok(data) => {
                if options.use_cache {
                    self.cache.set(resource_type, identifier, &data, options.ttl);
                }
                debug!(resource_type, identifier, "Fetched fresh data");
                Ok(Fetched::fresh(data))
            }
            Err(error) => {
                if options.use_cache {
                    if let Some(cached) = self.cache.get::<T>(resource_type, identifier) {
                        warn!(resource_type, identifier, %error, "Fetch failed, falling back to cache");
                        let mut fetched = Fetched::cached(cached, Provenance::FallbackToCache);
                        fetched.error = Some(error.to_string());
                        return Ok(fetched);
                    }
                }
                warn!(resource_type, identifier, %error, "Fetch failed with no cached fallback");
                Err(DataError::FetchFailed(error))
            }
        }
    }

    /// Weather snapshot for a location
    pub async fn get_weather(
        &self,
        location_id: &str,
        options: FetchOptions,
    ) -> Result<Fetched<WeatherSnapshot>, DataError> {
        let gateway = self.gateway.clone();
        let id = location_id.to_string();
        self.get_or_fetch(WEATHER_RESOURCE, location_id, options, move || async move {
            gateway.fetch_weather(&id).await
        })
        .await
    }

    /// The first `hours` hours and `days` days of a location's forecast.
    ///
    /// Both series come from a single `get_weather` call, so they share one
    /// provenance and at most one background refresh.
    pub async fn forecast(
        &self,
        location_id: &str,
        hours: usize,
        days: usize,
        options: FetchOptions,
    ) -> Result<Fetched<Forecast>, DataError> {
        let weather = self.get_weather(location_id, options).await?;
        Ok(weather.map(|snapshot| Forecast {
            hourly: snapshot.hourly.into_iter().take(hours).collect(),
            daily: snapshot.daily.into_iter().take(days).collect(),
        }))
    }

    /// The first `hours` hours of a location's hourly forecast
    pub async fn hourly_forecast(
        &self,
        location_id: &str,
        hours: usize,
        options: FetchOptions,
    ) -> Result<Fetched<Vec<HourlyForecast>>, DataError> {
        let forecast = self.forecast(location_id, hours, 0, options).await?;
        Ok(forecast.map(|forecast| forecast.hourly))
    }

    /// The first `days` days of a location's daily forecast
    pub async fn daily_forecast(
        &self,
        location_id: &str,
        days: usize,
        options: FetchOptions,
    ) -> Result<Fetched<Vec<DailyForecast>>, DataError> {
        let forecast = self.forecast(location_id, 0, days, options).await?;
        Ok(forecast.map(|forecast| forecast.daily))
    }

    /// Fetches and caches every location that has no valid cache entry.
    ///
    /// Does nothing while offline. Locations are fetched concurrently and a
    /// failure only skips that location. Returns how many were stored.
    pub async fn preload_locations<I, S>(&self, location_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.network.is_online() {
            debug!("Offline, skipping preload");
            return 0;
        }

        let ids: Vec<String> = location_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let results = join_all(ids.iter().map(|id| async move {
            if self
                .cache
                .get::<WeatherSnapshot>(WEATHER_RESOURCE, id)
                .is_some()
            {
                return false;
            }

            match self.gateway.fetch_weather(id).await {
                Ok(snapshot) => self
                    .cache
                    .set(WEATHER_RESOURCE, id, &snapshot, None)
                    .is_persisted(),
                Err(error) => {
                    warn!(location_id = %id, %error, "Failed to preload location");
                    false
                }
            }
        }))
        .await;

        let stored = results.into_iter().filter(|stored| *stored).count();
        info!(stored, requested = ids.len(), "Preloaded locations");
        stored
    }
}
