//! Shared fixtures for cache integration tests

#![allow(dead_code)]

use bridge_traits::{Clock, CoverArt, TrackInfo};
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_cache::{CacheConfig, CacheStore, SaveRequest};
use core_index::db::create_test_pool;
use core_index::SqliteCacheIndex;
use core_metadata::NoopProbe;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Config for a temp cache: no size or bitrate thresholds, no ID3 writing.
pub fn config(base: &Path) -> CacheConfig {
    CacheConfig::new(base)
        .with_max_size(0)
        .with_min_size(0)
        .with_min_bitrate(0)
        .with_embed_tags(false)
}

/// Store over a fresh in-memory index, without running `init`.
pub async fn bare_store(config: CacheConfig, clock: Arc<ManualClock>) -> CacheStore {
    let pool = create_test_pool().await.unwrap();
    CacheStore::new(config, Arc::new(SqliteCacheIndex::new(pool)))
        .with_clock(clock)
        .with_probe(Arc::new(NoopProbe))
}

pub async fn store(config: CacheConfig, clock: Arc<ManualClock>) -> CacheStore {
    let store = bare_store(config, clock).await;
    store.init().await.unwrap();
    store
}

pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

pub fn track(title: &str, artist: &str, bitrate_kbps: Option<u32>) -> TrackInfo {
    TrackInfo {
        title: Some(title.to_string()),
        artists: vec![artist.to_string()],
        album: Some("Album".to_string()),
        bitrate_kbps,
    }
}

pub fn request(tag: &str, id: i64, bytes: Vec<u8>, info: TrackInfo) -> SaveRequest {
    SaveRequest {
        tag: tag.to_string(),
        id,
        stream: Box::new(std::io::Cursor::new(bytes)),
        mime_type: "audio/mpeg".to_string(),
        extension: "mp3".to_string(),
        source_url: format!("http://upstream.test/{id}.mp3"),
        info,
        lyrics: None,
        cover: None,
    }
}

pub fn cover(bytes: &'static [u8], file_name: &str) -> CoverArt {
    CoverArt {
        data: bytes::Bytes::from_static(bytes),
        file_name: Some(file_name.to_string()),
    }
}
