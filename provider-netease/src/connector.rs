//! NetEase Cloud Music API connector
//!
//! Talks to a NeteaseCloudMusicApi-compatible HTTP service and implements
//! `AudioSource` on top of it.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::source::{
    AudioSource, CoverArt, FetchRequest, FetchedAudio, RequestOptions, TrackInfo,
};
use core_metadata::mime::{extension_for_mime, extension_from_url, mime_for_extension};
use core_runtime::config::NeteaseSettings;
use core_runtime::logging::redact;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{NeteaseError, Result};
use crate::types::{LyricResponse, SongDetail, SongDetailResponse, SongUrl, SongUrlResponse};

/// Containers preferred when the URL, API and headers disagree
const PREFERRED_EXTENSIONS: &[&str] = &["flac", "ape", "mp3"];

/// Size hint appended to cover URLs
const COVER_SIZE_PARAM: &str = "param=600y600";

const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Longest upstream error body carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// NetEase API client
///
/// Every call carries the cookie, `realIP` and `proxy` from the per-request
/// [`RequestOptions`], falling back to the configured defaults.
///
/// # Example
///
/// ```ignore
/// use provider_netease::NeteaseClient;
/// use bridge_traits::source::{AudioSource, FetchRequest};
///
/// let client = NeteaseClient::new(http_client, &settings);
/// let audio = client.fetch(&FetchRequest::new("daily", 1859245776)).await?;
/// ```
pub struct NeteaseClient {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    defaults: RequestOptions,
}

impl NeteaseClient {
    pub fn new(http_client: Arc<dyn HttpClient>, settings: &NeteaseSettings) -> Self {
        let cookie = Some(settings.cookie.trim().to_string()).filter(|c| !c.is_empty());
        Self {
            http_client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            defaults: RequestOptions {
                cookie,
                real_ip: settings.real_ip.clone().filter(|ip| !ip.is_empty()),
                proxy: settings.proxy.clone().filter(|p| !p.is_empty()),
                timeout: Some(settings.timeout),
            },
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    fn build_request(&self, url: String, options: &RequestOptions) -> HttpRequest {
        let mut request = HttpRequest::get(url);
        if let Some(cookie) = &options.cookie {
            request = request.header("Cookie", cookie.clone());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    /// Call an API endpoint and return the JSON body.
    ///
    /// Fails on a non-2xx status and on a body whose `code` is present but
    /// not 200.
    #[instrument(skip(self, params, options), fields(endpoint = %endpoint))]
    pub async fn call(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        options: &RequestOptions,
    ) -> Result<Value> {
        let options = options.clone().or(&self.defaults);
        let url = format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'));

        let mut request = self.build_request(url, &options);
        for (key, value) in params {
            request = request.query(*key, value.clone());
        }
        if let Some(real_ip) = &options.real_ip {
            request = request.query("realIP", real_ip.clone());
        }
        if let Some(proxy) = &options.proxy {
            request = request.query("proxy", proxy.clone());
        }

        debug!(
            cookie = %redact("cookie", options.cookie.as_deref().unwrap_or_default()),
            real_ip = ?options.real_ip,
            "Calling NetEase API"
        );
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "NetEase API request failed");
            return Err(NeteaseError::Api {
                status: response.status,
                message: error_body(&response),
            });
        }

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| NeteaseError::ParseError(e.to_string()))?;

        if let Some(code) = body.get("code").and_then(Value::as_i64) {
            if code != 200 {
                let message = body
                    .get("message")
                    .or_else(|| body.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                warn!(code, message = %message, "NetEase API rejected request");
                return Err(NeteaseError::Rejected { code, message });
            }
        }

        debug!("NetEase API request succeeded");
        Ok(body)
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        options: &RequestOptions,
    ) -> Result<T> {
        let body = self.call(endpoint, params, options).await?;
        serde_json::from_value(body).map_err(|e| NeteaseError::ParseError(e.to_string()))
    }

    /// Resolve the playable URL of a song. `bitrate` is in bits per second.
    pub async fn song_url(
        &self,
        id: i64,
        bitrate: Option<u32>,
        options: &RequestOptions,
    ) -> Result<SongUrl> {
        let mut params = vec![("id", id.to_string())];
        if let Some(br) = bitrate {
            params.push(("br", br.to_string()));
        }
        let response: SongUrlResponse = self.call_typed("song/url", &params, options).await?;
        response
            .data
            .into_iter()
            .next()
            .ok_or(NeteaseError::MissingStreamUrl)
    }

    pub async fn song_detail(&self, id: i64, options: &RequestOptions) -> Result<Option<SongDetail>> {
        let response: SongDetailResponse = self
            .call_typed("song/detail", &[("ids", id.to_string())], options)
            .await?;
        Ok(response.songs.into_iter().next())
    }

    /// Lyrics in LRC form; the translation is used when no original exists.
    pub async fn lyric(&self, id: i64, options: &RequestOptions) -> Result<Option<String>> {
        let response: LyricResponse = self
            .call_typed("lyric", &[("id", id.to_string())], options)
            .await?;
        Ok(response.best())
    }

    pub async fn search(
        &self,
        keywords: &str,
        kind: u32,
        limit: u32,
        offset: u32,
        options: &RequestOptions,
    ) -> Result<Value> {
        let params = [
            ("keywords", keywords.to_string()),
            ("type", kind.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        self.call("cloudsearch", &params, options).await
    }

    pub async fn playlist_detail(&self, id: i64, options: &RequestOptions) -> Result<Value> {
        self.call("playlist/detail", &[("id", id.to_string())], options)
            .await
    }

    pub async fn playlist_tracks(
        &self,
        id: i64,
        limit: Option<u32>,
        offset: Option<u32>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let mut params = vec![("id", id.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset", offset.to_string()));
        }
        self.call("playlist/track/all", &params, options).await
    }

    async fn download_cover(&self, pic_url: &str, options: &RequestOptions) -> Result<CoverArt> {
        let separator = if pic_url.contains('?') { '&' } else { '?' };
        let url = format!("{pic_url}{separator}{COVER_SIZE_PARAM}");

        let mut request = HttpRequest::get(url);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        let response = self.http_client.execute(request).await?;
        if !response.is_success() || response.body.is_empty() {
            return Err(NeteaseError::Api {
                status: response.status,
                message: "cover download failed".to_string(),
            });
        }

        let extension = response
            .header("content-type")
            .and_then(extension_for_mime)
            .unwrap_or("jpg");
        Ok(CoverArt {
            data: response.body,
            file_name: Some(format!("cover.{extension}")),
        })
    }

    /// Title, artists, album and cover. Failures leave the fields empty.
    async fn describe(
        &self,
        id: i64,
        bitrate_kbps: Option<u32>,
        options: &RequestOptions,
    ) -> (TrackInfo, Option<CoverArt>) {
        let mut info = TrackInfo {
            bitrate_kbps,
            ..TrackInfo::default()
        };

        let detail = match self.song_detail(id, options).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(id, error = %e, "Song detail unavailable");
                None
            }
        };
        let Some(song) = detail else {
            return (info, None);
        };

        info.title = song.name.filter(|n| !n.is_empty());
        info.artists = song
            .ar
            .into_iter()
            .filter_map(|artist| artist.name)
            .filter(|name| !name.is_empty())
            .collect();

        let mut cover = None;
        if let Some(album) = song.al {
            info.album = album.name.filter(|n| !n.is_empty());
            if let Some(pic_url) = album.pic_url.filter(|u| !u.is_empty()) {
                match self.download_cover(&pic_url, options).await {
                    Ok(art) => cover = Some(art),
                    Err(e) => warn!(id, error = %e, "Cover download failed"),
                }
            }
        }

        (info, cover)
    }
}

#[async_trait]
impl AudioSource for NeteaseClient {
    #[instrument(skip(self, request), fields(tag = %request.tag, id = request.id))]
    async fn fetch(&self, request: &FetchRequest) -> BridgeResult<FetchedAudio> {
        let options = request.options.clone().or(&self.defaults);

        let song = self.song_url(request.id, request.bitrate, &options).await?;
        let url = song
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(NeteaseError::MissingStreamUrl)?;

        // Catalog timeouts are too short for whole songs; the client-wide
        // limit bounds the download instead.
        let stream = self
            .http_client
            .download_stream(HttpRequest::get(url.clone()))
            .await?;

        let header_mime = stream
            .content_type()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_AUDIO_MIME)
            .to_string();
        let extension = pick_extension(&url, song.kind.as_deref(), &header_mime);
        let mime_type = resolve_mime(&header_mime, &extension);
        let bitrate_kbps = song.br.map(|br| (br / 1000.0).round() as u32);

        let (info, cover) = self.describe(request.id, bitrate_kbps, &options).await;
        let lyrics = match self.lyric(request.id, &options).await {
            Ok(lyrics) => lyrics,
            Err(e) => {
                warn!(id = request.id, error = %e, "Lyrics unavailable");
                None
            }
        };

        info!(
            extension = %extension,
            mime_type = %mime_type,
            bitrate_kbps = ?bitrate_kbps,
            "Resolved upstream audio"
        );

        Ok(FetchedAudio {
            stream: stream.body,
            mime_type,
            extension,
            source_url: url,
            info,
            lyrics,
            cover,
        })
    }
}

/// Choose the file extension from the URL, the API's `type` and the
/// response MIME type, preferring lossless containers and mp3.
pub fn pick_extension(url: &str, api_type: Option<&str>, mime: &str) -> String {
    let candidates: Vec<String> = [
        extension_from_url(url),
        api_type
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty()),
        extension_for_mime(mime).map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect();

    candidates
        .iter()
        .find(|c| PREFERRED_EXTENSIONS.contains(&c.as_str()))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| "bin".to_string())
}

/// Generic binary content types are replaced by the type implied by the
/// extension.
pub fn resolve_mime(header_mime: &str, extension: &str) -> String {
    let lowered = header_mime.to_ascii_lowercase();
    if lowered.contains("octet") || lowered.contains("application") {
        mime_for_extension(extension)
            .map(str::to_string)
            .unwrap_or_else(|| header_mime.to_string())
    } else {
        header_mime.to_string()
    }
}

fn error_body(response: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return format!("HTTP {}", response.status);
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
