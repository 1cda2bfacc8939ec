//! Background cache refresh
//!
//! When a request is served from a valid cache entry, the entry is refreshed
//! in a spawned task that the caller never awaits (stale-while-revalidate).
//! Outcomes can be observed through an optional channel of `RefreshMessage`s.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::gateway::GatewayError;

/// Capacity of the channel returned by `refresh_channel`
const CHANNEL_CAPACITY: usize = 32;

/// Messages sent from background refreshes to whoever is listening
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// The cache entry was replaced with freshly fetched data
    Refreshed {
        resource_type: String,
        identifier: String,
    },
    /// The fetch failed; the existing entry was left as it was
    RefreshFailed {
        resource_type: String,
        identifier: String,
        error: String,
    },
}

/// Creates a channel for refresh notifications
pub fn refresh_channel() -> (mpsc::Sender<RefreshMessage>, mpsc::Receiver<RefreshMessage>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// A spawned refresh of one cache entry.
///
/// Dropping the handle does not cancel the task: a refresh always runs to
/// completion, and its only effect is a cache write that is safe to apply late.
#[derive(Debug)]
pub struct BackgroundRefresh {
    handle: JoinHandle<()>,
}

impl BackgroundRefresh {
    /// Spawns `fetch` and writes its result to the cache when it succeeds.
    /// Failures are logged and reported on `notifier`, never returned.
    pub fn spawn<T, Fut>(
        cache: Arc<CacheStore>,
        resource_type: String,
        identifier: String,
        ttl: Option<Duration>,
        fetch: Fut,
        notifier: Option<mpsc::Sender<RefreshMessage>>,
    ) -> Self
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let message = match fetch.await {
                Ok(data) => {
                    let outcome = cache.set(&resource_type, &identifier, &data, ttl);
                    debug!(%resource_type, %identifier, ?outcome, "Background refresh stored");
                    RefreshMessage::Refreshed {
                        resource_type,
                        identifier,
                    }
                }
                Err(error) => {
                    warn!(%resource_type, %identifier, %error, "Background refresh failed");
                    RefreshMessage::RefreshFailed {
                        resource_type,
                        identifier,
                        error: error.to_string(),
                    }
                }
            };

            if let Some(tx) = notifier {
                let _ = tx.send(message).await;
            }
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the refresh to finish
    pub async fn wait(self) {
        if let Err(error) = self.handle.await {
            warn!(%error, "Background refresh task aborted");
        }
    }
}
