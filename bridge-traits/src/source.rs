//! Audio Source Abstraction
//!
//! The contract between the cache and whatever upstream produces audio bytes.
//! A source resolves a `(tag, id)` request into a byte stream plus the
//! descriptive metadata the cache persists next to it.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::Result;
use crate::http::DynAsyncRead;

/// Per-request upstream options. Unset fields fall back to the source's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub cookie: Option<String>,
    pub real_ip: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_real_ip(mut self, real_ip: impl Into<String>) -> Self {
        self.real_ip = Some(real_ip.into());
        self
    }

    /// Fill every unset field from `defaults`.
    pub fn or(self, defaults: &RequestOptions) -> Self {
        Self {
            cookie: self.cookie.or_else(|| defaults.cookie.clone()),
            real_ip: self.real_ip.or_else(|| defaults.real_ip.clone()),
            proxy: self.proxy.or_else(|| defaults.proxy.clone()),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// A request for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub tag: String,
    pub id: i64,
    /// Preferred bitrate in bits per second, as the upstream expects it.
    pub bitrate: Option<u32>,
    pub options: RequestOptions,
}

impl FetchRequest {
    pub fn new(tag: impl Into<String>, id: i64) -> Self {
        Self {
            tag: tag.into(),
            id,
            bitrate: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Descriptive track information reported by the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Declared bitrate in kbps. A probe of the downloaded file may override it.
    pub bitrate_kbps: Option<u32>,
}

/// Cover art bytes and the file name to store them under.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverArt {
    pub data: Bytes,
    pub file_name: Option<String>,
}

/// Everything a source hands back for one track.
pub struct FetchedAudio {
    pub stream: Box<DynAsyncRead>,
    pub mime_type: String,
    pub extension: String,
    pub source_url: String,
    pub info: TrackInfo,
    pub lyrics: Option<String>,
    pub cover: Option<CoverArt>,
}

impl std::fmt::Debug for FetchedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedAudio")
            .field("mime_type", &self.mime_type)
            .field("extension", &self.extension)
            .field("source_url", &self.source_url)
            .field("info", &self.info)
            .field("has_lyrics", &self.lyrics.is_some())
            .field("has_cover", &self.cover.is_some())
            .finish_non_exhaustive()
    }
}

/// Upstream audio provider
///
/// Invoked at most once per key at a time; any error is a rejection and is not
/// retried at this layer.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedAudio>;
}
