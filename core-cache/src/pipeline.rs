//! Cache-or-fetch orchestration

use crate::coordinator::{DownloadCoordinator, SharedResult};
use crate::error::CacheError;
use crate::models::SaveRequest;
use crate::store::CacheStore;
use bridge_traits::{AudioSource, FetchRequest};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Serves cache hits and funnels misses through the coordinator, so each key
/// is downloaded from the source at most once at a time.
#[derive(Clone)]
pub struct FetchPipeline {
    store: Arc<CacheStore>,
    source: Arc<dyn AudioSource>,
    coordinator: DownloadCoordinator,
}

impl FetchPipeline {
    pub fn new(store: Arc<CacheStore>, source: Arc<dyn AudioSource>) -> Self {
        Self {
            store,
            source,
            coordinator: DownloadCoordinator::new(),
        }
    }

    pub fn with_coordinator(mut self, coordinator: DownloadCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &DownloadCoordinator {
        &self.coordinator
    }

    /// Return the cached entry, downloading it first on a miss.
    #[instrument(skip(self, request), fields(tag = %request.tag, id = request.id))]
    pub async fn get_or_fetch(&self, request: FetchRequest) -> SharedResult {
        if let Some(entry) = self.store.get(&request.tag, request.id).await.map_err(Arc::new)? {
            return Ok(entry);
        }

        debug!("Cache miss, fetching from source");
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let tag = request.tag.clone();
        let id = request.id;

        self.coordinator
            .fetch_or_wait(&tag, id, move || async move {
                let fetched = source.fetch(&request).await.map_err(CacheError::from)?;
                info!(
                    tag = %request.tag,
                    id = request.id,
                    source_url = %fetched.source_url,
                    "Fetched audio from source"
                );
                store
                    .save(SaveRequest::from_fetched(request.tag.clone(), request.id, fetched))
                    .await
            })
            .await
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("base_dir", &self.store.base_dir())
            .finish_non_exhaustive()
    }
}
