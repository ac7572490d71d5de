//! HTTP handlers.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use bridge_traits::source::{FetchRequest, RequestOptions};
use chrono::{DateTime, SecondsFormat, Utc};
use core_cache::{CacheEntry, CacheStats, CacheStore};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::range::{parse_range, RangeRequest};
use crate::state::AppState;

/// Tag used when a request names none.
pub const DEFAULT_TAG: &str = "untagged";

const COOKIE_HEADER: &str = "x-netease-cookie";
const REAL_IP_HEADER: &str = "x-real-ip";

const DEFAULT_SEARCH_TYPE: u32 = 1;
const DEFAULT_SEARCH_LIMIT: u32 = 30;
const DEFAULT_PLAYLIST_LIMIT: u32 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct SongQuery {
    pub tag: Option<String>,
    /// Preferred bitrate in bits per second
    pub br: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub keywords: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Listing row for `GET /api/cache`. Paths are relative to the cache root.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryView {
    pub id: i64,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub artists: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub size: u64,
    pub mime_type: String,
    pub created_at: Option<String>,
    pub last_accessed_at: Option<String>,
    pub audio_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_file: Option<String>,
    pub folder: String,
    pub audio_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<String>,
    pub has_lyrics: bool,
    pub has_cover: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    pub transient: bool,
}

impl CacheEntryView {
    pub fn from_entry(entry: &CacheEntry, base: &FsPath) -> Self {
        let meta = &entry.metadata;
        let lyrics_path = entry.lyrics_path.as_deref().map(|p| relative(p, base));
        let cover_path = entry.cover_path.as_deref().map(|p| relative(p, base));

        Self {
            id: meta.id,
            tag: meta.tag.clone(),
            title: meta.title.clone(),
            artists: meta.artists.clone(),
            album: meta.album.clone(),
            size: meta.size,
            mime_type: meta.mime_type.clone(),
            created_at: meta.created_at.map(iso),
            last_accessed_at: meta.last_accessed_at.map(iso),
            audio_file: meta.audio_file.clone(),
            lyrics_file: meta.lyrics_file.clone(),
            cover_file: meta.cover_file.clone(),
            folder: meta.folder.clone(),
            audio_path: relative(&entry.audio_path, base),
            has_lyrics: meta.lyrics_file.is_some() && lyrics_path.is_some(),
            has_cover: meta.cover_file.is_some() && cover_path.is_some(),
            lyrics_path,
            cover_path,
            duration_seconds: meta.duration_seconds,
            bitrate_kbps: meta.bitrate_kbps,
            transient: entry.transient,
        }
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn relative(path: &FsPath, base: &FsPath) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cacheDir": state.store.base_dir().display().to_string(),
    }))
}

pub async fn stream_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SongQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_song(state, &id, query, &headers, false).await
}

pub async fn download_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SongQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_song(state, &id, query, &headers, true).await
}

#[instrument(skip(state, raw_id, query, headers), fields(id = %raw_id))]
async fn serve_song(
    state: AppState,
    raw_id: &str,
    query: SongQuery,
    headers: &HeaderMap,
    attachment: bool,
) -> ApiResult<Response> {
    let id = parse_song_id(raw_id)?;
    let tag = query
        .tag
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TAG);

    let mut request = FetchRequest::new(tag, id).with_options(request_options(headers));
    if let Some(br) = query.br.as_deref().and_then(|b| b.trim().parse::<u32>().ok()) {
        request = request.with_bitrate(br);
    }

    let entry = state.pipeline.get_or_fetch(request).await?;

    let open_error = |e: std::io::Error| {
        error!(path = %entry.audio_path.display(), error = %e, "Failed to open cached audio");
        ApiError::Internal(format!("Failed to read cached audio: {e}"))
    };
    let mut file = File::open(&entry.audio_path).await.map_err(open_error)?;
    let size = file.metadata().await.map_err(open_error)?.len();

    let range = parse_range(headers.get(RANGE).and_then(|v| v.to_str().ok()), size);
    let (status, start, length) = match range {
        RangeRequest::Full => (StatusCode::OK, 0, size),
        RangeRequest::Partial(r) => (StatusCode::PARTIAL_CONTENT, r.start, r.length()),
        RangeRequest::Unsatisfiable => return Err(ApiError::RangeNotSatisfiable { size }),
    };
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await.map_err(open_error)?;
    }

    let guard = entry.transient.then(|| {
        TransientGuard::new(
            Arc::clone(&state.store),
            entry.metadata.tag.clone(),
            entry.metadata.id,
        )
    });
    let body = Body::from_stream(GuardedStream {
        inner: ReaderStream::new(file.take(length)),
        _guard: guard,
    });

    let mime = Some(entry.metadata.mime_type.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream");

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, mime)
        .header(CONTENT_LENGTH, length)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_DISPOSITION, content_disposition(&entry, attachment));
    if let RangeRequest::Partial(r) = range {
        response = response.header(CONTENT_RANGE, r.content_range(size));
    }

    debug!(status = status.as_u16(), length, transient = entry.transient, "Serving audio");
    response
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))
}

fn content_disposition(entry: &CacheEntry, attachment: bool) -> String {
    let disposition = if attachment { "attachment" } else { "inline" };
    let file_name = Some(entry.metadata.audio_file.clone())
        .filter(|f| !f.is_empty())
        .or_else(|| {
            entry
                .audio_path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
        });

    match file_name {
        Some(name) => format!("{disposition}; filename=\"{}\"", urlencoding::encode(&name)),
        None => disposition.to_string(),
    }
}

/// Removes a transient entry once the response body is finished or dropped.
struct TransientGuard {
    store: Arc<CacheStore>,
    tag: String,
    id: i64,
}

impl TransientGuard {
    fn new(store: Arc<CacheStore>, tag: String, id: i64) -> Self {
        Self { store, tag, id }
    }
}

impl Drop for TransientGuard {
    fn drop(&mut self) {
        let store = Arc::clone(&self.store);
        let tag = std::mem::take(&mut self.tag);
        let id = self.id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if store.remove(&tag, id).await.log().is_some() {
                        debug!(tag = %tag, id, "Removed transient entry after serving");
                    }
                });
            }
            Err(_) => warn!(tag = %tag, id, "No runtime available to remove transient entry"),
        }
    }
}

/// Body stream that keeps a [`TransientGuard`] alive until it is dropped.
struct GuardedStream<S> {
    inner: S,
    _guard: Option<TransientGuard>,
}

impl<S> Stream for GuardedStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub async fn list_cache(State(state): State<AppState>) -> ApiResult<Json<Vec<CacheEntryView>>> {
    let base = state.store.base_dir();
    let entries = state.store.list().await?;
    Ok(Json(
        entries
            .iter()
            .map(|entry| CacheEntryView::from_entry(entry, base))
            .collect(),
    ))
}

pub async fn cache_stats(State(state): State<AppState>) -> ApiResult<Json<CacheStats>> {
    let stats = state.store.stats().await?;
    if stats.is_over_budget() {
        warn!(
            usage_percent = stats.usage_percentage(),
            "Cache is over budget until the next save evicts"
        );
    }
    Ok(Json(stats))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let keywords = query
        .q
        .as_deref()
        .or(query.keywords.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing search query (?q=)".to_string()))?;

    let kind = parse_number(query.kind.as_deref(), "type")?.unwrap_or(DEFAULT_SEARCH_TYPE);
    let limit = parse_number(query.limit.as_deref(), "limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let offset = parse_number(query.offset.as_deref(), "offset")?.unwrap_or(0);

    let mut body = state
        .catalog
        .search(keywords, kind, limit, offset, &request_options(&headers))
        .await?;

    if body.get("result").is_some_and(|r| !r.is_null()) {
        Ok(Json(body["result"].take()))
    } else {
        Ok(Json(body))
    }
}

pub async fn song_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let id = parse_song_id(&id)?;
    let body = state
        .catalog
        .call("song/detail", &[("ids", id.to_string())], &request_options(&headers))
        .await?;
    Ok(Json(body))
}

pub async fn song_lyrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let id = parse_song_id(&id)?;
    let body = state
        .catalog
        .call("lyric", &[("id", id.to_string())], &request_options(&headers))
        .await?;
    Ok(Json(body))
}

pub async fn playlist_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let id = parse_playlist_id(&id)?;
    let body = state
        .catalog
        .playlist_detail(id, &request_options(&headers))
        .await?;
    Ok(Json(body))
}

pub async fn playlist_tracks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let id = parse_playlist_id(&id)?;
    let limit = parse_number(query.limit.as_deref(), "limit")?.unwrap_or(DEFAULT_PLAYLIST_LIMIT);
    let offset = parse_number(query.offset.as_deref(), "offset")?;
    let body = state
        .catalog
        .playlist_tracks(id, Some(limit), offset, &request_options(&headers))
        .await?;
    Ok(Json(body))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// Per-request upstream overrides taken from the client's headers.
fn request_options(headers: &HeaderMap) -> RequestOptions {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    RequestOptions {
        cookie: header(COOKIE_HEADER),
        real_ip: header(REAL_IP_HEADER),
        ..RequestOptions::default()
    }
}

fn parse_song_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest("Invalid song id".to_string()))
}

fn parse_playlist_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest("Invalid playlist id".to_string()))
}

/// Blank means absent; anything else must be a non-negative integer.
fn parse_number(raw: Option<&str>, name: &str) -> ApiResult<Option<u32>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {name}: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_options_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE_HEADER, HeaderValue::from_static("MUSIC_U=abc"));
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("  "));

        let options = request_options(&headers);
        assert_eq!(options.cookie.as_deref(), Some("MUSIC_U=abc"));
        assert!(options.real_ip.is_none());
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(None, "limit").unwrap(), None);
        assert_eq!(parse_number(Some(" "), "limit").unwrap(), None);
        assert_eq!(parse_number(Some("30"), "limit").unwrap(), Some(30));
        assert!(parse_number(Some("-1"), "limit").is_err());
    }

    #[test]
    fn test_parse_song_id() {
        assert_eq!(parse_song_id(" 42 ").unwrap(), 42);
        assert!(matches!(parse_song_id("abc"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_relative_paths() {
        let base = FsPath::new("/srv/cache");
        assert_eq!(
            relative(FsPath::new("/srv/cache/mix/A/B (1)/B.mp3"), base),
            "mix/A/B (1)/B.mp3"
        );
        assert_eq!(relative(FsPath::new("/elsewhere/x.mp3"), base), "/elsewhere/x.mp3");
    }
}
