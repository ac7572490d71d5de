//! Integration tests for the HTTP routes.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream};
use bridge_traits::source::{AudioSource, FetchRequest, FetchedAudio, TrackInfo};
use bytes::Bytes;
use core_cache::{CacheConfig, CacheStore};
use core_index::db::create_test_pool;
use core_index::SqliteCacheIndex;
use core_metadata::NoopProbe;
use core_runtime::config::ServerConfig;
use core_service::{create_router, AppState};
use mockall::mock;
use provider_netease::NeteaseClient;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mock! {
    Source {}

    #[async_trait]
    impl AudioSource for Source {
        async fn fetch(&self, request: &FetchRequest) -> BridgeResult<FetchedAudio>;
    }
}

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, request: HttpRequest) -> BridgeResult<HttpStream>;
    }
}

const AUDIO: &[u8] = b"0123456789abcdefghij";
const MIB: u64 = 1024 * 1024;

struct TestApp {
    router: axum::Router,
    store: Arc<CacheStore>,
    _dir: TempDir,
}

async fn app_with(source: MockSource, http: MockHttp, min_size_bytes: u64) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig::default()
        .with_cache_dir(dir.path())
        .with_api_base("http://api.test");

    let cache = CacheConfig::new(dir.path())
        .with_max_size(0)
        .with_min_size(min_size_bytes)
        .with_min_bitrate(0)
        .with_embed_tags(false);
    let pool = create_test_pool().await.unwrap();
    let store = Arc::new(
        CacheStore::new(cache, Arc::new(SqliteCacheIndex::new(pool)))
            .with_probe(Arc::new(NoopProbe)),
    );
    store.init().await.unwrap();

    let catalog = Arc::new(NeteaseClient::new(Arc::new(http), &config.netease));
    let state = AppState::new(config, Arc::clone(&store), Arc::new(source), catalog);

    TestApp {
        router: create_router(state),
        store,
        _dir: dir,
    }
}

async fn app(source: MockSource) -> TestApp {
    app_with(source, MockHttp::new(), 0).await
}

fn fetched() -> FetchedAudio {
    FetchedAudio {
        stream: Box::new(std::io::Cursor::new(AUDIO.to_vec())),
        mime_type: "audio/mpeg".to_string(),
        extension: "mp3".to_string(),
        source_url: "http://cdn.test/42.mp3".to_string(),
        info: TrackInfo {
            title: Some("My Song".to_string()),
            artists: vec!["Artist".to_string()],
            album: Some("Album".to_string()),
            bitrate_kbps: Some(320),
        },
        lyrics: Some("[00:00.00]la".to_string()),
        cover: None,
    }
}

fn catalog_response(body: Value) -> BridgeResult<HttpResponse> {
    Ok(HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    })
}

async fn send(
    router: &axum::Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

async fn get_json(router: &axum::Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let (status, _, body) = send(router, uri, headers).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = app(MockSource::new()).await;

    let (status, body) = get_json(&app.router, "/api/health", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(
        body["cacheDir"],
        app.store.base_dir().display().to_string()
    );
}

#[tokio::test]
async fn test_stream_fetches_once_then_serves_from_cache() {
    let mut source = MockSource::new();
    source
        .expect_fetch()
        .times(1)
        .returning(|_| Ok(fetched()));
    let app = app(source).await;

    for _ in 0..2 {
        let (status, headers, body) = send(&app.router, "/api/songs/42/stream", &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), AUDIO);
        assert_eq!(headers["content-type"], "audio/mpeg");
        assert_eq!(headers["content-length"], AUDIO.len().to_string());
        assert_eq!(headers["accept-ranges"], "bytes");
        assert_eq!(
            headers["content-disposition"],
            "inline; filename=\"My%20Song.mp3\""
        );
    }
}

#[tokio::test]
async fn test_download_uses_attachment_and_sanitized_tag() {
    let mut source = MockSource::new();
    source
        .expect_fetch()
        .withf(|req| req.tag == "Road Trip" && req.id == 42)
        .times(1)
        .returning(|_| Ok(fetched()));
    let app = app(source).await;

    let (status, headers, _) =
        send(&app.router, "/api/songs/42/download?tag=Road%20Trip", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"My%20Song.mp3\""
    );
    assert!(app.store.get("road-trip", 42).await.unwrap().is_some());
}

#[tokio::test]
async fn test_blank_tag_falls_back_to_default() {
    let mut source = MockSource::new();
    source
        .expect_fetch()
        .withf(|req| req.tag == "untagged")
        .times(1)
        .returning(|_| Ok(fetched()));
    let app = app(source).await;

    let (status, _, _) = send(&app.router, "/api/songs/42/stream?tag=%20%20", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.store.get("untagged", 42).await.unwrap().is_some());
}

#[tokio::test]
async fn test_headers_and_bitrate_reach_the_source() {
    let mut source = MockSource::new();
    source
        .expect_fetch()
        .withf(|req| {
            req.options.cookie.as_deref() == Some("MUSIC_U=mine")
                && req.options.real_ip.as_deref() == Some("1.2.3.4")
                && req.bitrate == Some(320000)
        })
        .times(1)
        .returning(|_| Ok(fetched()));
    let app = app(source).await;

    let (status, _, _) = send(
        &app.router,
        "/api/songs/42/stream?br=320000",
        &[("x-netease-cookie", "MUSIC_U=mine"), ("x-real-ip", "1.2.3.4")],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_range_request_returns_partial_content() {
    let mut source = MockSource::new();
    source.expect_fetch().returning(|_| Ok(fetched()));
    let app = app(source).await;

    let (status, headers, body) =
        send(&app.router, "/api/songs/42/stream", &[("range", "bytes=2-5")]).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body.as_ref(), &AUDIO[2..=5]);
    assert_eq!(headers["content-length"], "4");
    assert_eq!(
        headers["content-range"],
        format!("bytes 2-5/{}", AUDIO.len())
    );

    let (status, _, body) =
        send(&app.router, "/api/songs/42/stream", &[("range", "bytes=-3")]).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body.as_ref(), &AUDIO[AUDIO.len() - 3..]);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let mut source = MockSource::new();
    source.expect_fetch().returning(|_| Ok(fetched()));
    let app = app(source).await;

    let (status, headers, body) =
        send(&app.router, "/api/songs/42/stream", &[("range", "bytes=999-")]).await;

    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        headers["content-range"],
        format!("bytes */{}", AUDIO.len())
    );
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "range_not_satisfiable");
}

#[tokio::test]
async fn test_invalid_song_id_is_bad_request() {
    let mut source = MockSource::new();
    source.expect_fetch().never();
    let app = app(source).await;

    let (status, body) = get_json(&app.router, "/api/songs/abc/stream", &[]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert_eq!(body["message"], "Invalid song id");
}

#[tokio::test]
async fn test_source_failure_is_bad_gateway_and_caches_nothing() {
    let mut source = MockSource::new();
    source.expect_fetch().times(1).returning(|_| {
        Err(BridgeError::OperationFailed(
            "Failed to resolve song stream URL".to_string(),
        ))
    });
    let app = app(source).await;

    let (status, body) = get_json(&app.router, "/api/songs/42/stream", &[]).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "upstream_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Failed to resolve song stream URL"));
    assert!(app.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_entry_is_removed_after_serving() {
    let mut source = MockSource::new();
    source.expect_fetch().times(2).returning(|_| Ok(fetched()));
    let app = app_with(source, MockHttp::new(), 4 * MIB).await;

    let (status, _, body) = send(&app.router, "/api/songs/42/stream", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), AUDIO);

    let mut removed = false;
    for _ in 0..50 {
        if app.store.get("untagged", 42).await.unwrap().is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed, "transient entry should be removed after the response");

    // The next request downloads again
    let (status, _, body) = send(&app.router, "/api/songs/42/stream", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), AUDIO);
}

#[tokio::test]
async fn test_cache_listing_and_stats() {
    let mut source = MockSource::new();
    source.expect_fetch().returning(|_| Ok(fetched()));
    let app = app(source).await;

    send(&app.router, "/api/songs/42/stream?tag=mix", &[]).await;

    let (status, body) = get_json(&app.router, "/api/cache", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry["id"], 42);
    assert_eq!(entry["tag"], "mix");
    assert_eq!(entry["title"], "My Song");
    assert_eq!(entry["artists"], json!(["Artist"]));
    assert_eq!(entry["folder"], "Artist/My Song (42)");
    assert_eq!(entry["audioPath"], "mix/Artist/My Song (42)/My Song.mp3");
    assert_eq!(entry["lyricsPath"], "mix/Artist/My Song (42)/My Song.lrc");
    assert_eq!(entry["hasLyrics"], true);
    assert_eq!(entry["hasCover"], false);
    assert_eq!(entry["transient"], false);
    assert_eq!(entry["size"], AUDIO.len());
    assert!(entry["createdAt"].is_string());

    let (status, stats) = get_json(&app.router, "/api/cache/stats", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["totalBytes"], AUDIO.len());
    assert_eq!(stats["maxSizeBytes"], 0);
}

#[tokio::test]
async fn test_search_requires_query() {
    let app = app(MockSource::new()).await;

    let (status, body) = get_json(&app.router, "/api/search", &[]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing search query (?q=)");
}

#[tokio::test]
async fn test_search_unwraps_result() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| {
            req.url == "http://api.test/cloudsearch"
                && req.query_value("keywords") == Some("lofi beats")
                && req.query_value("type") == Some("1")
                && req.query_value("limit") == Some("30")
                && req.query_value("offset") == Some("0")
                && req.query_value("realIP") == Some("9.9.9.9")
        })
        .times(1)
        .returning(|_| catalog_response(json!({ "code": 200, "result": { "songs": [{ "id": 1 }] } })));
    let app = app_with(MockSource::new(), http, 0).await;

    let (status, body) = get_json(
        &app.router,
        "/api/search?keywords=lofi%20beats",
        &[("x-real-ip", "9.9.9.9")],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "songs": [{ "id": 1 }] }));
}

#[tokio::test]
async fn test_catalog_rejection_is_bad_gateway() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .returning(|_| catalog_response(json!({ "code": 301, "msg": "login required" })));
    let app = app_with(MockSource::new(), http, 0).await;

    let (status, body) = get_json(&app.router, "/api/songs/7", &[]).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["message"].as_str().unwrap().contains("login required"));
}

#[tokio::test]
async fn test_lyrics_pass_through() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.url == "http://api.test/lyric" && req.query_value("id") == Some("7"))
        .times(1)
        .returning(|_| catalog_response(json!({ "code": 200, "lrc": { "lyric": "[00:01]hi" } })));
    let app = app_with(MockSource::new(), http, 0).await;

    let (status, body) = get_json(&app.router, "/api/songs/7/lyrics", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lrc"]["lyric"], "[00:01]hi");
}

#[tokio::test]
async fn test_playlist_tracks_default_limit() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| {
            req.url == "http://api.test/playlist/track/all"
                && req.query_value("id") == Some("99")
                && req.query_value("limit") == Some("200")
                && req.query_value("offset").is_none()
        })
        .times(1)
        .returning(|_| catalog_response(json!({ "code": 200, "songs": [] })));
    let app = app_with(MockSource::new(), http, 0).await;

    let (status, body) = get_json(&app.router, "/api/playlists/99/tracks", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["songs"], json!([]));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = app(MockSource::new()).await;

    let (status, body) = get_json(&app.router, "/api/nope", &[]).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}
