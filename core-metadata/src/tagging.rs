//! ID3 tag embedding
//!
//! Writes title, artist, album, lyrics and front cover into mp3 downloads so
//! the cached file is self-describing when copied out of the cache.

use async_trait::async_trait;
use bytes::Bytes;
use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, ItemKey, Tag, TagExt, TagType};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MetadataError, Result};

/// Descriptive fields to embed
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub lyrics: Option<String>,
    pub cover: Option<Bytes>,
    /// Cover MIME type, e.g. `image/png`. JPEG is assumed when absent.
    pub cover_mime: Option<String>,
}

/// Writes tags into an audio file in place
#[async_trait]
pub trait TagEmbedder: Send + Sync {
    /// Whether files with this extension are handled
    fn supports(&self, extension: &str) -> bool;

    async fn embed(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

/// ID3v2 writer for mp3 files, backed by `lofty`
#[derive(Debug, Clone, Default)]
pub struct Id3TagEmbedder;

impl Id3TagEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn build_tag(path: &Path, tags: &TrackTags) -> Tag {
        let mut tag = Tag::new(TagType::Id3v2);

        let title = tags.title.clone().or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        });
        if let Some(title) = title {
            tag.set_title(title);
        }
        if !tags.artists.is_empty() {
            tag.set_artist(tags.artists.join(" / "));
        }
        if let Some(album) = &tags.album {
            tag.set_album(album.clone());
        }
        if let Some(lyrics) = &tags.lyrics {
            tag.insert_text(ItemKey::Lyrics, lyrics.clone());
        }
        if let Some(cover) = &tags.cover {
            let mime = match tags.cover_mime.as_deref() {
                Some("image/png") => MimeType::Png,
                Some("image/gif") => MimeType::Gif,
                Some("image/bmp") => MimeType::Bmp,
                _ => MimeType::Jpeg,
            };
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                Some(mime),
                tags.title.clone(),
                cover.to_vec(),
            ));
        }

        tag
    }

    fn embed_blocking(path: &Path, tags: &TrackTags) -> Result<()> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()));
        }

        let tag = Self::build_tag(path, tags);
        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| MetadataError::TagWriteFailed(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl TagEmbedder for Id3TagEmbedder {
    fn supports(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case("mp3")
    }

    async fn embed(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        let owned: PathBuf = path.to_path_buf();
        let tags_owned = tags.clone();
        tokio::task::spawn_blocking(move || Self::embed_blocking(&owned, &tags_owned))
            .await
            .map_err(|e| MetadataError::Task(e.to_string()))??;

        debug!(path = %path.display(), "Embedded ID3 tags");
        Ok(())
    }
}
