//! Index row model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Flattened projection of a cached entry's metadata.
///
/// Title, artists and album are not indexed; they live only in the entry's
/// `metadata.json`. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IndexRow {
    /// Sanitized tag namespace
    pub tag: String,
    /// Numeric id, unique within the tag
    pub id: i64,
    /// Entry folder relative to the tag directory (`.` for legacy entries)
    pub folder: String,
    /// Audio file name relative to the entry folder
    pub audio_file: String,
    pub lyrics_file: Option<String>,
    pub cover_file: Option<String>,
    pub duration_seconds: Option<f64>,
    pub bitrate_kbps: Option<i64>,
    /// Size of the audio artifact in bytes
    pub size: i64,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub mime_type: Option<String>,
    pub extension: Option<String>,
    pub source_url: Option<String>,
}

impl IndexRow {
    /// Minimal row for an entry; optional columns start empty.
    pub fn new(
        tag: impl Into<String>,
        id: i64,
        folder: impl Into<String>,
        audio_file: impl Into<String>,
        size: i64,
        created_at: i64,
    ) -> Self {
        Self {
            tag: tag.into(),
            id,
            folder: folder.into(),
            audio_file: audio_file.into(),
            lyrics_file: None,
            cover_file: None,
            duration_seconds: None,
            bitrate_kbps: None,
            size,
            created_at,
            last_accessed_at: created_at,
            mime_type: None,
            extension: None,
            source_url: None,
        }
    }

    /// Validate row invariants before writing
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.tag.trim().is_empty() {
            return Err("Tag cannot be empty".to_string());
        }
        if self.audio_file.trim().is_empty() {
            return Err("Audio file cannot be empty".to_string());
        }
        if self.size < 0 {
            return Err(format!("Size cannot be negative: {}", self.size));
        }
        if self.last_accessed_at < self.created_at {
            return Err(format!(
                "Last access ({}) precedes creation ({})",
                self.last_accessed_at, self.created_at
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_starts_with_equal_timestamps() {
        let row = IndexRow::new("chill", 42, "Artist/Song (42)", "Song.mp3", 1000, 5);
        assert_eq!(row.created_at, row.last_accessed_at);
        assert!(row.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_rows() {
        let mut row = IndexRow::new("chill", 1, ".", "1.bin", 10, 100);
        row.last_accessed_at = 50;
        assert!(row.validate().is_err());

        let row = IndexRow::new(" ", 1, ".", "1.bin", 10, 100);
        assert!(row.validate().is_err());

        let row = IndexRow::new("chill", 1, ".", "1.bin", -1, 100);
        assert!(row.validate().is_err());
    }
}
