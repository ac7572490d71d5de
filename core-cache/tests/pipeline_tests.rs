//! Cache-or-fetch pipeline against a mocked audio source

mod common;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{AudioSource, FetchRequest, FetchedAudio};
use common::*;
use core_cache::FetchPipeline;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mock! {
    Source {}

    #[async_trait]
    impl AudioSource for Source {
        async fn fetch(&self, request: &FetchRequest) -> BridgeResult<FetchedAudio>;
    }
}

fn fetched(bytes: Vec<u8>, title: &str) -> FetchedAudio {
    FetchedAudio {
        stream: Box::new(std::io::Cursor::new(bytes)),
        mime_type: "audio/flac".to_string(),
        extension: "flac".to_string(),
        source_url: "http://upstream.test/a.flac".to_string(),
        info: track(title, "Band", Some(900)),
        lyrics: Some("[00:00.00]la".to_string()),
        cover: None,
    }
}

#[tokio::test]
async fn test_miss_fetches_then_hit_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(config(dir.path()), ManualClock::new()).await);

    let mut source = MockSource::new();
    source
        .expect_fetch()
        .withf(|request| request.tag == "mix" && request.id == 11)
        .times(1)
        .returning(|_| Ok(fetched(payload(3000, 5), "Track")));

    let pipeline = FetchPipeline::new(Arc::clone(&store), Arc::new(source));

    let first = pipeline
        .get_or_fetch(FetchRequest::new("mix", 11))
        .await
        .unwrap();
    assert_eq!(first.metadata.extension, "flac");
    assert_eq!(first.metadata.audio_file, "Track.flac");
    assert!(first.lyrics_path.is_some());

    let second = pipeline
        .get_or_fetch(FetchRequest::new("mix", 11))
        .await
        .unwrap();
    assert_eq!(second.audio_path, first.audio_path);
    assert_eq!(
        tokio::fs::read(&second.audio_path).await.unwrap(),
        payload(3000, 5)
    );
}

#[tokio::test]
async fn test_source_failure_creates_no_entry() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(config(dir.path()), ManualClock::new()).await);

    let mut source = MockSource::new();
    source.expect_fetch().times(2).returning(|_| {
        Err(BridgeError::OperationFailed(
            "Failed to resolve song stream URL".to_string(),
        ))
    });

    let pipeline = FetchPipeline::new(Arc::clone(&store), Arc::new(source));

    let error = pipeline
        .get_or_fetch(FetchRequest::new("t", 1))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("Failed to resolve song stream URL"));
    assert!(store.get("t", 1).await.unwrap().is_none());
    assert_eq!(pipeline.coordinator().in_flight().await, 0);

    // Failures are not cached
    assert!(pipeline.get_or_fetch(FetchRequest::new("t", 1)).await.is_err());
}

/// Source that holds every fetch open for a while and counts invocations.
struct SlowSource {
    calls: AtomicUsize,
}

#[async_trait]
impl AudioSource for SlowSource {
    async fn fetch(&self, _request: &FetchRequest) -> BridgeResult<FetchedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(fetched(payload(1000, 1), "Shared"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_download_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(config(dir.path()), ManualClock::new()).await);
    let source = Arc::new(SlowSource {
        calls: AtomicUsize::new(0),
    });
    let pipeline = FetchPipeline::new(store, source.clone());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.get_or_fetch(FetchRequest::new("t", 77)).await })
        })
        .collect();

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap().audio_path);
    }

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(paths.windows(2).all(|pair| pair[0] == pair[1]));
}
