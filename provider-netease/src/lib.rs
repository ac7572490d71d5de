//! # NetEase Cloud Music Provider
//!
//! Implements [`AudioSource`](bridge_traits::source::AudioSource) against a
//! NeteaseCloudMusicApi-compatible service, plus the catalog passthroughs
//! (search, song detail, lyrics, playlists) the HTTP surface exposes.
//!
//! ## Overview
//!
//! A fetch resolves the song URL (`/song/url`), opens the audio stream, and
//! gathers title, artists, album, cover (`/song/detail`) and lyrics
//! (`/lyric`). Only the stream URL is required; everything else is optional
//! and a failure there is logged and skipped.
//!
//! ## Usage
//!
//! ```ignore
//! use provider_netease::NeteaseClient;
//!
//! let client = NeteaseClient::new(http_client, &config.netease);
//! let results = client.search("lofi", 1, 30, 0, &RequestOptions::default()).await?;
//! ```

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{pick_extension, resolve_mime, NeteaseClient};
pub use error::{NeteaseError, Result};
