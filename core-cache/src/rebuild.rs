//! Index reconstruction from the on-disk layout

use crate::error::{CacheError, Result};
use crate::models::RebuildReport;
use crate::paths::{is_safe_folder, join_folder, read_pointer, METADATA_FILE, POINTER_SUFFIX};
use crate::store::{read_metadata, CacheStore};
use core_index::IndexRow;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

impl CacheStore {
    /// Clear the index and repopulate it from every tag directory.
    ///
    /// Pointer files and legacy `<id>.json` files become rows; anything that
    /// cannot be read, has a non-numeric id or lacks its audio is skipped.
    /// A legacy file whose id also has a pointer is skipped too.
    #[instrument(skip(self), fields(base_dir = %self.base_dir().display()))]
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        self.index.clear().await?;

        let now = self.clock.now_millis();
        let mut report = RebuildReport::default();

        for tag in self.tag_dirs().await? {
            let tag_dir = self.resolver.tag_dir(&tag);
            let mut dir = fs::read_dir(&tag_dir)
                .await
                .map_err(CacheError::io(&tag_dir))?;

            while let Some(item) = dir.next_entry().await.map_err(CacheError::io(&tag_dir))? {
                let name = item.file_name().to_string_lossy().into_owned();

                let row = if let Some(stem) = name.strip_suffix(POINTER_SUFFIX) {
                    row_from_pointer(&tag, &tag_dir, stem, now).await
                } else if let Some(stem) = name.strip_suffix(".json") {
                    // A pointer for the same id wins over the flat layout
                    let pointer = tag_dir.join(format!("{stem}{POINTER_SUFFIX}"));
                    if fs::try_exists(&pointer).await.unwrap_or(false) {
                        Err("shadowed by pointer file".to_string())
                    } else {
                        row_from_legacy(&tag, &tag_dir, stem, now).await
                    }
                } else {
                    continue;
                };

                match row {
                    Ok(row) => match self.index.upsert(&row).await {
                        Ok(()) => report.inserted += 1,
                        Err(error) => {
                            warn!(tag = %tag, file = %name, error = %error, "Failed to index entry");
                            report.skipped += 1;
                        }
                    },
                    Err(reason) => {
                        debug!(tag = %tag, file = %name, reason = %reason, "Skipped during rebuild");
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "Index rebuild finished"
        );
        Ok(report)
    }
}

async fn row_from_pointer(
    tag: &str,
    tag_dir: &Path,
    stem: &str,
    now: i64,
) -> std::result::Result<IndexRow, String> {
    let id = parse_id(stem)?;
    let pointer = read_pointer(&tag_dir.join(format!("{stem}{POINTER_SUFFIX}")))
        .await
        .map_err(|e| format!("unreadable pointer: {e}"))?;

    let folder = if pointer.folder.trim().is_empty() {
        ".".to_string()
    } else {
        pointer.folder.clone()
    };
    if folder != "." && !is_safe_folder(&folder) {
        return Err(format!("unsafe folder {folder:?}"));
    }
    if pointer.audio_file.is_empty() {
        return Err("pointer names no audio file".to_string());
    }

    let song_dir = join_folder(tag_dir, &folder);
    let size = audio_size(&song_dir.join(&pointer.audio_file)).await?;

    let mut row = IndexRow::new(tag, id, folder, pointer.audio_file, size, now);
    row.lyrics_file = pointer.lyrics_file;
    row.cover_file = pointer.cover_file;

    if let Ok(metadata) = read_metadata(&song_dir.join(METADATA_FILE)).await {
        apply_metadata(&mut row, &metadata);
    }
    Ok(row)
}

async fn row_from_legacy(
    tag: &str,
    tag_dir: &Path,
    stem: &str,
    now: i64,
) -> std::result::Result<IndexRow, String> {
    let id = parse_id(stem)?;
    let size = audio_size(&tag_dir.join(format!("{id}.bin"))).await?;
    let metadata = read_metadata(&tag_dir.join(format!("{stem}.json")))
        .await
        .map_err(|e| e.to_string())?;

    let mut row = IndexRow::new(tag, id, ".", format!("{id}.bin"), size, now);
    apply_metadata(&mut row, &metadata);

    let lyrics = format!("{id}.lrc");
    if fs::metadata(tag_dir.join(&lyrics)).await.is_ok() {
        row.lyrics_file = Some(lyrics);
    }
    let cover = format!("{id}.cover");
    if fs::metadata(tag_dir.join(&cover)).await.is_ok() {
        row.cover_file = Some(cover);
    }
    Ok(row)
}

fn apply_metadata(row: &mut IndexRow, metadata: &crate::models::CacheMetadata) {
    if let Some(created) = metadata.created_at {
        row.created_at = created.timestamp_millis();
    }
    row.last_accessed_at = metadata
        .last_accessed_at
        .map(|t| t.timestamp_millis())
        .unwrap_or(row.created_at)
        .max(row.created_at);
    row.duration_seconds = metadata.duration_seconds;
    row.bitrate_kbps = metadata.bitrate_kbps.map(i64::from);
    row.mime_type = Some(metadata.mime_type.clone()).filter(|s| !s.is_empty());
    row.extension = Some(metadata.extension.clone()).filter(|s| !s.is_empty());
    row.source_url = Some(metadata.source_url.clone()).filter(|s| !s.is_empty());
}

fn parse_id(stem: &str) -> std::result::Result<i64, String> {
    stem.parse::<i64>()
        .map_err(|_| format!("non-numeric id {stem:?}"))
}

async fn audio_size(path: &Path) -> std::result::Result<i64, String> {
    let stat = fs::metadata(path)
        .await
        .map_err(|_| format!("missing audio {}", path.display()))?;
    i64::try_from(stat.len()).map_err(|e| e.to_string())
}
