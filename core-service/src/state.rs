//! Shared application state.

use anyhow::{Context, Result};
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::source::AudioSource;
use core_cache::{CacheConfig, CacheStore, FetchPipeline};
use core_runtime::config::{CacheSettings, ServerConfig};
use provider_netease::NeteaseClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Overall limit for one upstream request, audio downloads included.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<CacheStore>,
    pub pipeline: FetchPipeline,
    /// Catalog pass-through calls
    pub catalog: Arc<NeteaseClient>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<CacheStore>,
        source: Arc<dyn AudioSource>,
        catalog: Arc<NeteaseClient>,
    ) -> Self {
        let pipeline = FetchPipeline::new(Arc::clone(&store), source);
        Self {
            config: Arc::new(config),
            store,
            pipeline,
            catalog,
        }
    }

    /// Wire the production stack: reqwest client, NetEase source and the
    /// on-disk cache.
    pub async fn bootstrap(config: ServerConfig) -> Result<Self> {
        let http_client = ReqwestHttpClient::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .connect_timeout(config.netease.timeout)
            .proxy(config.netease.proxy.clone())
            .build()
            .context("failed to build HTTP client")?;

        let netease = Arc::new(NeteaseClient::new(Arc::new(http_client), &config.netease));

        let store = CacheStore::open(cache_config(&config.cache))
            .await
            .context("failed to open cache store")?;
        info!(base_dir = %store.base_dir().display(), "Cache store ready");

        Ok(Self::new(
            config,
            Arc::new(store),
            netease.clone(),
            netease,
        ))
    }
}

/// Cache store settings derived from the server configuration.
pub fn cache_config(settings: &CacheSettings) -> CacheConfig {
    CacheConfig::new(settings.dir.clone())
        .with_max_size(settings.max_size_bytes)
        .with_ttl(settings.ttl)
        .with_min_size(settings.min_size_bytes)
        .with_min_bitrate(settings.min_bitrate_kbps)
        .with_embed_tags(settings.embed_tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_mirrors_settings() {
        let settings = CacheSettings {
            dir: "/tmp/tunes".into(),
            max_size_bytes: 1024,
            ttl: Duration::from_secs(60),
            min_size_bytes: 10,
            min_bitrate_kbps: 128,
            embed_tags: false,
        };

        let config = cache_config(&settings);
        assert_eq!(config.base_dir, std::path::PathBuf::from("/tmp/tunes"));
        assert_eq!(config.max_size_bytes, 1024);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.min_size_bytes, 10);
        assert_eq!(config.min_bitrate_kbps, 128);
        assert!(!config.embed_tags);
    }
}
