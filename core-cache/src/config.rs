//! Cache configuration and quality policy

use std::path::PathBuf;
use std::time::Duration;

/// File name of the SQLite index inside the base directory.
pub const INDEX_FILE: &str = "_index.db";

const MIB: u64 = 1024 * 1024;

/// Configuration for the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one sub-directory per tag plus the index database
    pub base_dir: PathBuf,

    /// Total size budget in bytes; 0 disables eviction (default: 2 GiB)
    pub max_size_bytes: u64,

    /// Entry lifetime measured from creation; zero disables expiry (default: 24h)
    pub ttl: Duration,

    /// Entries smaller than this are transient (default: 4 MiB)
    pub min_size_bytes: u64,

    /// Entries with a known bitrate below this are transient (default: 192 kbps)
    pub min_bitrate_kbps: u32,

    /// Embed ID3 tags into mp3 downloads (default: true)
    pub embed_tags: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./cache"),
            max_size_bytes: 2048 * MIB,
            ttl: Duration::from_secs(24 * 60 * 60),
            min_size_bytes: 4 * MIB,
            min_bitrate_kbps: 192,
            embed_tags: true,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `base_dir` with default limits.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Set the total size budget.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the transience size threshold.
    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size_bytes = bytes;
        self
    }

    /// Set the transience bitrate threshold.
    pub fn with_min_bitrate(mut self, kbps: u32) -> Self {
        self.min_bitrate_kbps = kbps;
        self
    }

    /// Enable or disable ID3 embedding.
    pub fn with_embed_tags(mut self, enabled: bool) -> Self {
        self.embed_tags = enabled;
        self
    }

    /// Path of the SQLite index.
    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    /// An entry is transient when it is too small, or its bitrate is known and too low.
    pub fn is_transient(&self, size: u64, bitrate_kbps: Option<u32>) -> bool {
        let bitrate = bitrate_kbps.unwrap_or(0);
        size < self.min_size_bytes || (bitrate > 0 && bitrate < self.min_bitrate_kbps)
    }

    /// True when the size budget is smaller than the transience threshold,
    /// so every entry that fits is served once and deleted.
    pub fn budget_below_min_size(&self) -> bool {
        self.max_size_bytes > 0 && self.min_size_bytes > self.max_size_bytes
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_dir.as_os_str().is_empty() {
            return Err("base_dir cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size_bytes, 2048 * MIB);
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.min_size_bytes, 4 * MIB);
        assert_eq!(config.min_bitrate_kbps, 192);
        assert!(config.embed_tags);
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new("/srv/cache")
            .with_max_size(1024)
            .with_ttl(Duration::ZERO)
            .with_min_size(10)
            .with_min_bitrate(128)
            .with_embed_tags(false);

        assert_eq!(config.index_path(), PathBuf::from("/srv/cache/_index.db"));
        assert_eq!(config.max_size_bytes, 1024);
        assert!(config.ttl.is_zero());
        assert_eq!(config.min_size_bytes, 10);
        assert_eq!(config.min_bitrate_kbps, 128);
        assert!(!config.embed_tags);
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::new("").validate().is_err());
        // A budget below the size threshold is allowed; entries are just transient
        let tight = CacheConfig::default().with_max_size(10).with_min_size(20);
        assert!(tight.validate().is_ok());
        assert!(tight.budget_below_min_size());
        assert!(!CacheConfig::default()
            .with_max_size(0)
            .with_min_size(20)
            .budget_below_min_size());
    }

    #[test]
    fn test_transience_policy() {
        let config = CacheConfig::default();

        assert!(config.is_transient(1000, Some(320)));
        assert!(config.is_transient(10 * MIB, Some(128)));
        assert!(!config.is_transient(10 * MIB, Some(320)));
        // Unknown bitrate only falls back to the size check
        assert!(!config.is_transient(10 * MIB, None));
        assert!(!config.is_transient(10 * MIB, Some(0)));
        assert!(!config.is_transient(4 * MIB, Some(192)));
    }
}
