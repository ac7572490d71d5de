//! Single-flight download coordination
//!
//! Concurrent requests for the same `(tag, id)` share one download. The
//! download runs as its own task, so a client that disconnects does not cancel
//! it for the others waiting on the same key.

use crate::error::CacheError;
use crate::models::CacheEntry;
use crate::paths::sanitize_tag;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Result every waiter on a key receives.
pub type SharedResult = Result<CacheEntry, Arc<CacheError>>;

type InFlight = Shared<BoxFuture<'static, SharedResult>>;

/// Keyed table of in-flight downloads. Clones share the table.
#[derive(Clone, Default)]
pub struct DownloadCoordinator {
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl DownloadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the in-flight download for the key, or start it with `fetch`.
    ///
    /// `fetch` is only invoked when no download for the key is running. The key
    /// is released before any waiter observes the result, so a failure is not
    /// remembered and the next call starts afresh.
    pub async fn fetch_or_wait<F, Fut>(&self, tag: &str, id: i64, fetch: F) -> SharedResult
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<CacheEntry, CacheError>> + Send + 'static,
    {
        let key = format!("{}:{}", sanitize_tag(tag), id);

        let shared = {
            let mut table = self.in_flight.lock().await;
            if let Some(existing) = table.get(&key) {
                debug!(key = %key, "Joining in-flight download");
                existing.clone()
            } else {
                debug!(key = %key, "Starting download");
                let shared = self.spawn(key.clone(), fetch()).boxed().shared();
                table.insert(key, shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Number of keys with a download in progress.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    fn spawn<Fut>(&self, key: String, fetch: Fut) -> impl Future<Output = SharedResult> + Send + 'static
    where
        Fut: Future<Output = Result<CacheEntry, CacheError>> + Send + 'static,
    {
        let table = Arc::clone(&self.in_flight);
        let task_key = key.clone();
        let task_table = Arc::clone(&table);
        let handle = tokio::spawn(async move {
            let result = fetch.await.map_err(Arc::new);
            task_table.lock().await.remove(&task_key);
            if let Err(error) = &result {
                error!(key = %task_key, error = %error, "Download failed");
            }
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    // The task never reached its own cleanup
                    table.lock().await.remove(&key);
                    error!(key = %key, error = %join_error, "Download task aborted");
                    Err(Arc::new(CacheError::Internal(format!(
                        "download task failed: {join_error}"
                    ))))
                }
            }
        }
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator").finish_non_exhaustive()
    }
}
