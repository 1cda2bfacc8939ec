//! hypercast library
//!
//! Offline-aware weather data access: a connectivity monitor, a TTL and
//! size-bounded cache persisted to a key-value store, and a policy layer
//! that decides per request whether to serve cached data, fetch, or fall
//! back, tagging every result with its provenance.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod data;
pub mod gateway;
pub mod network;
pub mod policy;
pub mod refresh;
pub mod storage;

pub use cache::{CacheInfo, CacheStore, Cached, WriteOutcome};
pub use context::Context;
pub use network::{ConnectivityEvent, NetworkMonitor, NetworkStatus};
pub use policy::{DataAccess, DataError, FetchOptions, Fetched, Provenance};
