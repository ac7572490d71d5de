//! Cache entry models

use bridge_traits::{CoverArt, DynAsyncRead, FetchedAudio, TrackInfo};
use chrono::{DateTime, Utc};
use core_index::IndexRow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Persistent record stored as `metadata.json` next to each audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub audio_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_file: Option<String>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(default, with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

fn default_folder() -> String {
    ".".to_string()
}

impl CacheMetadata {
    /// Expiry is measured from creation. A zero TTL never expires; a record
    /// without a creation time is always expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let Some(created) = self.created_at else {
            return true;
        };
        match now.signed_duration_since(created).to_std() {
            Ok(age) => age > ttl,
            // Created in the future
            Err(_) => false,
        }
    }

    pub fn to_index_row(&self) -> IndexRow {
        let created = self.created_at.map(|t| t.timestamp_millis()).unwrap_or(0);
        let accessed = self
            .last_accessed_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(created)
            .max(created);

        IndexRow {
            tag: self.tag.clone(),
            id: self.id,
            folder: self.folder.clone(),
            audio_file: self.audio_file.clone(),
            lyrics_file: self.lyrics_file.clone(),
            cover_file: self.cover_file.clone(),
            duration_seconds: self.duration_seconds,
            bitrate_kbps: self.bitrate_kbps.map(i64::from),
            size: i64::try_from(self.size).unwrap_or(i64::MAX),
            created_at: created,
            last_accessed_at: accessed,
            mime_type: non_empty(&self.mime_type),
            extension: non_empty(&self.extension),
            source_url: non_empty(&self.source_url),
        }
    }

    /// Metadata reconstructed from an index row; descriptive fields are absent.
    pub fn from_index_row(row: &IndexRow) -> Self {
        Self {
            id: row.id,
            tag: row.tag.clone(),
            title: None,
            artists: Vec::new(),
            album: None,
            source_url: row.source_url.clone().unwrap_or_default(),
            mime_type: row.mime_type.clone().unwrap_or_default(),
            extension: row.extension.clone().unwrap_or_default(),
            size: u64::try_from(row.size).unwrap_or(0),
            audio_file: row.audio_file.clone(),
            lyrics_file: row.lyrics_file.clone(),
            cover_file: row.cover_file.clone(),
            folder: row.folder.clone(),
            duration_seconds: row.duration_seconds,
            bitrate_kbps: row.bitrate_kbps.and_then(|b| u32::try_from(b).ok()),
            created_at: DateTime::from_timestamp_millis(row.created_at),
            last_accessed_at: DateTime::from_timestamp_millis(row.last_accessed_at),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Timestamps written as RFC 3339 strings; older records may carry unix
/// milliseconds. Anything else reads as absent.
pub(crate) mod lenient_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(parse(&value))
    }

    pub fn parse(value: &serde_json::Value) -> Option<DateTime<Utc>> {
        match value {
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub audio_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Set only when the lyrics file exists
    pub lyrics_path: Option<PathBuf>,
    /// Set only when the cover file exists
    pub cover_path: Option<PathBuf>,
    pub metadata: CacheMetadata,
    /// Serve once then delete
    pub transient: bool,
}

/// Input to [`CacheStore::save`](crate::CacheStore::save).
pub struct SaveRequest {
    pub tag: String,
    pub id: i64,
    pub stream: Box<DynAsyncRead>,
    pub mime_type: String,
    pub extension: String,
    pub source_url: String,
    pub info: TrackInfo,
    pub lyrics: Option<String>,
    pub cover: Option<CoverArt>,
}

impl SaveRequest {
    pub fn from_fetched(tag: impl Into<String>, id: i64, fetched: FetchedAudio) -> Self {
        Self {
            tag: tag.into(),
            id,
            stream: fetched.stream,
            mime_type: fetched.mime_type,
            extension: fetched.extension,
            source_url: fetched.source_url,
            info: fetched.info,
            lyrics: fetched.lyrics,
            cover: fetched.cover,
        }
    }
}

impl std::fmt::Debug for SaveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveRequest")
            .field("tag", &self.tag)
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("extension", &self.extension)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`rebuild_index`](crate::CacheStore::rebuild_index).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionReport {
    pub evicted: usize,
    pub freed_bytes: u64,
    /// Total cached bytes after the pass
    pub total_bytes: u64,
}
