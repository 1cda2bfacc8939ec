//! Connectivity tracking
//!
//! `NetworkMonitor` holds the current reachability flag and the time the
//! device was last seen coming online. It never probes the network itself:
//! the host delivers `ConnectivityEvent`s and the monitor records them,
//! persisting the status so it survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::KeyValueStore;

/// Persisted connectivity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Reachability as last reported by the host
    pub is_online: bool,
    /// Most recent transition into the online state
    pub last_online: DateTime<Utc>,
}

/// Connectivity notification delivered by the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Tracks connectivity transitions for the lifetime of the process
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    last_online: Mutex<DateTime<Utc>>,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    status_key: String,
    changes: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Creates a monitor seeded with the host's current reachability.
    ///
    /// A previously persisted `last_online` is carried over when starting offline.
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        status_key: impl Into<String>,
        initially_online: bool,
    ) -> Self {
        let status_key = status_key.into();
        let now = clock.now();

        let last_online = if initially_online {
            now
        } else {
            read_status(storage.as_ref(), &status_key)
                .map(|status| status.last_online)
                .unwrap_or(now)
        };

        let (changes, _) = watch::channel(initially_online);
        let monitor = Self {
            online: AtomicBool::new(initially_online),
            last_online: Mutex::new(last_online),
            storage,
            clock,
            status_key,
            changes,
        };
        monitor.persist();
        monitor
    }

    /// Current reachability flag
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// In-memory time of the last transition into the online state
    pub fn last_online(&self) -> DateTime<Utc> {
        *self.last_online.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a host connectivity notification
    pub fn handle(&self, event: ConnectivityEvent) {
        match event {
            ConnectivityEvent::Online => {
                let now = self.clock.now();
                *self.last_online.lock().unwrap_or_else(PoisonError::into_inner) = now;
                self.online.store(true, Ordering::SeqCst);
                info!(last_online = %now, "Network is online");
            }
            ConnectivityEvent::Offline => {
                self.online.store(false, Ordering::SeqCst);
                info!(last_online = %self.last_online(), "Network is offline");
            }
        }

        self.persist();
        self.changes.send_replace(self.is_online());
    }

    /// Reads the persisted status, falling back to the in-memory state
    /// when the record is missing or unreadable
    pub fn status(&self) -> NetworkStatus {
        read_status(self.storage.as_ref(), &self.status_key).unwrap_or_else(|| self.snapshot())
    }

    /// Watches the online flag; the receiver sees every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.changes.subscribe()
    }

    /// Consumes host notifications until the sender side is dropped
    pub fn listen(self: Arc<Self>, mut events: mpsc::Receiver<ConnectivityEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            debug!("Connectivity event source closed");
        })
    }

    fn snapshot(&self) -> NetworkStatus {
        NetworkStatus {
            is_online: self.is_online(),
            last_online: self.last_online(),
        }
    }

    fn persist(&self) {
        let status = self.snapshot();
        let result = serde_json::to_string(&status)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.storage
                    .set_item(&self.status_key, &json)
                    .map_err(|e| e.to_string())
            });

        if let Err(error) = result {
            warn!(%error, "Failed to update network status");
        }
    }
}

fn read_status(storage: &dyn KeyValueStore, key: &str) -> Option<NetworkStatus> {
    let raw = match storage.get_item(key) {
        Ok(raw) => raw?,
        Err(error) => {
            warn!(%error, "Failed to read network status");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(status) => Some(status),
        Err(error) => {
            warn!(%error, "Ignoring corrupt network status record");
            None
        }
    }
}
