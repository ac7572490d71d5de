//! # Cache Store
//!
//! Persists downloaded audio plus sidecars under `<base>/<tag>/` and keeps the
//! SQLite index in step with the filesystem.
//!
//! The per-entry `metadata.json` is authoritative. The index is a projection
//! used for listing, size accounting and eviction order; every index write on
//! the hot path is best-effort, and [`CacheStore::rebuild_index`] recreates
//! it from disk.

use crate::best_effort::BestEffort;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::models::{CacheEntry, CacheMetadata, EvictionReport, SaveRequest};
use crate::paths::{
    exists, is_safe_folder, pointer_path, sanitize_tag, EntryLayout, EntryPaths, EntryPointer,
    PathResolver, POINTER_SUFFIX,
};
use crate::stats::CacheStats;
use bridge_traits::{Clock, DynAsyncRead, SystemClock};
use core_index::{create_pool, CacheIndex, DatabaseConfig, IndexRow, SqliteCacheIndex};
use core_metadata::mime::mime_for_extension;
use core_metadata::{AudioProbe, Id3TagEmbedder, LoftyProbe, TagEmbedder, TrackTags};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

/// Content-addressed cache of downloaded audio, keyed by `(tag, id)`.
pub struct CacheStore {
    pub(crate) config: CacheConfig,
    pub(crate) resolver: PathResolver,
    pub(crate) index: Arc<dyn CacheIndex>,
    pub(crate) clock: Arc<dyn Clock>,
    probe: Arc<dyn AudioProbe>,
    tagger: Arc<dyn TagEmbedder>,
}

impl CacheStore {
    /// Create a store over an existing index.
    ///
    /// Uses the system clock, `lofty` probing and ID3 embedding; see the
    /// `with_*` builders to substitute them. Call [`init`](Self::init) before use.
    pub fn new(config: CacheConfig, index: Arc<dyn CacheIndex>) -> Self {
        let resolver = PathResolver::new(config.base_dir.clone());
        Self {
            config,
            resolver,
            index,
            clock: Arc::new(SystemClock),
            probe: Arc::new(LoftyProbe::new()),
            tagger: Arc::new(Id3TagEmbedder::new()),
        }
    }

    /// Open the SQLite index at `<base>/_index.db` and initialize the store.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let store = Self::connect(config).await?;
        store.init().await?;
        Ok(store)
    }

    /// Open the SQLite index without initializing the store.
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        config.validate().map_err(CacheError::Config)?;
        if config.budget_below_min_size() {
            warn!(
                max_size_bytes = config.max_size_bytes,
                min_size_bytes = config.min_size_bytes,
                "Cache budget is below the transience size threshold; entries will be served once"
            );
        }
        fs::create_dir_all(&config.base_dir)
            .await
            .map_err(CacheError::io(&config.base_dir))?;

        let pool = create_pool(DatabaseConfig::new(config.index_path())).await?;
        Ok(Self::new(config, Arc::new(SqliteCacheIndex::new(pool))))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn AudioProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_tag_embedder(mut self, tagger: Arc<dyn TagEmbedder>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        self.resolver.base_dir()
    }

    /// Create the base directory. An empty index next to existing tag
    /// directories is rebuilt from disk.
    #[instrument(skip(self), fields(base_dir = %self.base_dir().display()))]
    pub async fn init(&self) -> Result<()> {
        let base = self.resolver.base_dir();
        fs::create_dir_all(base).await.map_err(CacheError::io(base))?;

        if self.index.count().await? == 0 && !self.tag_dirs().await?.is_empty() {
            info!("Cache index is empty but entries exist on disk, rebuilding");
            if let Some(report) = BestEffort::new("rebuild index", self.rebuild_index().await).log()
            {
                info!(
                    inserted = report.inserted,
                    skipped = report.skipped,
                    "Cache index rebuilt"
                );
            }
        }

        info!("Cache store initialized");
        Ok(())
    }

    /// Look up an entry. Missing, unreadable and expired entries are `None`.
    ///
    /// A hit refreshes the entry's last-access time.
    #[instrument(skip(self))]
    pub async fn get(&self, tag: &str, id: i64) -> Result<Option<CacheEntry>> {
        let tag = sanitize_tag(tag);
        let Some(layout) = self.resolver.resolve(&tag, id).await else {
            debug!(tag = %tag, id, "Cache miss");
            return Ok(None);
        };
        let paths = layout.paths();

        let mut metadata = match read_metadata(&paths.metadata).await {
            Ok(metadata) => metadata,
            Err(error) => {
                debug!(path = %paths.metadata.display(), error = %error, "Unreadable metadata, treating as miss");
                return Ok(None);
            }
        };
        normalize_metadata(&mut metadata, &layout, &tag, id);

        let now = self.clock.now();
        if metadata.is_expired(now, self.config.ttl) {
            info!(tag = %tag, id, "Cache entry expired");
            self.remove(&tag, id).await.log();
            return Ok(None);
        }

        let audio = match fs::File::open(&paths.audio).await {
            Ok(file) => file,
            Err(error) => {
                debug!(path = %paths.audio.display(), error = %error, "Audio file not readable");
                return Ok(None);
            }
        };
        if metadata.size == 0 {
            if let Ok(stat) = audio.metadata().await {
                metadata.size = stat.len();
            }
        }
        drop(audio);

        let accessed = metadata.created_at.map_or(now, |created| created.max(now));
        metadata.last_accessed_at = Some(accessed);
        BestEffort::new("persist access time", write_json(&paths.metadata, &metadata).await).log();
        BestEffort::new(
            "touch index",
            self.index
                .touch(&tag, id, accessed.timestamp_millis())
                .await
                .map_err(CacheError::from),
        )
        .log();

        debug!(tag = %tag, id, "Cache hit");
        Ok(Some(self.build_entry(&paths, metadata).await))
    }

    /// Stream a download into the cache and record it.
    ///
    /// The payload lands in a temp file that is renamed into place only after
    /// the stream completes, so a failed download leaves no entry behind.
    #[instrument(skip(self, request), fields(tag = %request.tag, id = request.id))]
    pub async fn save(&self, request: SaveRequest) -> Result<CacheEntry> {
        let SaveRequest {
            tag,
            id,
            mut stream,
            mime_type,
            extension,
            source_url,
            info,
            lyrics,
            cover,
        } = request;

        let tag = sanitize_tag(&tag);
        let extension = normalize_extension(&extension);
        let lyrics = lyrics.filter(|text| !text.trim().is_empty());
        let cover = cover.filter(|art| !art.data.is_empty());

        let previous = self.resolver.resolve(&tag, id).await;
        let plan = self.resolver.plan(
            &tag,
            id,
            &info,
            &extension,
            lyrics.is_some(),
            cover.as_ref().map(|art| art.file_name.as_deref().unwrap_or("")),
        );
        let paths = &plan.paths;

        fs::create_dir_all(&paths.song_dir)
            .await
            .map_err(CacheError::io(&paths.song_dir))?;

        if let Err(error) = write_stream(&plan.temp_audio, &mut stream).await {
            error!(tag = %tag, id, error = %error, "Download failed, discarding partial file");
            BestEffort::new("remove temp file", remove_file_if_exists(&plan.temp_audio).await).log();
            return Err(error);
        }
        fs::rename(&plan.temp_audio, &paths.audio)
            .await
            .map_err(CacheError::io(&paths.audio))?;

        let probed = BestEffort::new(
            "probe audio",
            self.probe.probe(&paths.audio).await.map_err(CacheError::from),
        )
        .log()
        .unwrap_or_default();
        let bitrate_kbps = probed
            .bitrate_kbps
            .filter(|kbps| *kbps > 0)
            .or(info.bitrate_kbps);

        if self.config.embed_tags && self.tagger.supports(&extension) {
            let tags = TrackTags {
                title: info.title.clone(),
                artists: info.artists.clone(),
                album: info.album.clone(),
                lyrics: lyrics.clone(),
                cover: cover.as_ref().map(|art| art.data.clone()),
                cover_mime: plan
                    .pointer
                    .cover_file
                    .as_deref()
                    .and_then(|name| name.rsplit_once('.'))
                    .and_then(|(_, ext)| mime_for_extension(ext))
                    .map(str::to_string),
            };
            BestEffort::new(
                "embed tags",
                self.tagger.embed(&paths.audio, &tags).await.map_err(CacheError::from),
            )
            .log();
        }

        let size = fs::metadata(&paths.audio)
            .await
            .map_err(CacheError::io(&paths.audio))?
            .len();
        let now = self.clock.now();

        let metadata = CacheMetadata {
            id,
            tag: tag.clone(),
            title: info.title,
            artists: info.artists,
            album: info.album,
            source_url,
            mime_type,
            extension,
            size,
            audio_file: plan.pointer.audio_file.clone(),
            lyrics_file: plan.pointer.lyrics_file.clone(),
            cover_file: plan.pointer.cover_file.clone(),
            folder: plan.pointer.folder.clone(),
            duration_seconds: probed.duration_seconds,
            bitrate_kbps,
            created_at: Some(now),
            last_accessed_at: Some(now),
        };

        write_json(&paths.metadata, &metadata).await?;
        write_json(&paths.pointer, &plan.pointer).await?;
        if let Some(text) = &lyrics {
            fs::write(&paths.lyrics, text)
                .await
                .map_err(CacheError::io(&paths.lyrics))?;
        }
        if let Some(art) = &cover {
            fs::write(&paths.cover, &art.data)
                .await
                .map_err(CacheError::io(&paths.cover))?;
        }

        if let Some(previous) = previous {
            self.discard_previous(&previous, &plan.pointer, paths).await.log();
        }

        BestEffort::new(
            "index upsert",
            self.index
                .upsert(&metadata.to_index_row())
                .await
                .map_err(CacheError::from),
        )
        .log();

        let entry = self.build_entry(paths, metadata).await;
        info!(
            tag = %tag,
            id,
            size,
            bitrate = ?entry.metadata.bitrate_kbps,
            transient = entry.transient,
            path = %entry.audio_path.display(),
            "Saved cache entry"
        );

        BestEffort::new("enforce capacity", self.evict_to_budget(Some((&tag, id))).await).log();
        Ok(entry)
    }

    /// Delete an entry's files, pointer and index row.
    ///
    /// Every step runs even when an earlier one fails; the index row is
    /// always removed.
    #[instrument(skip(self))]
    pub async fn remove(&self, tag: &str, id: i64) -> BestEffort<()> {
        let tag = sanitize_tag(tag);
        let mut failures = Vec::new();

        if let Some(layout) = self.resolver.resolve(&tag, id).await {
            failures.extend(remove_artifacts(&layout).await);
        }

        let pointer = pointer_path(&self.resolver.tag_dir(&tag), id);
        if let Err(error) = remove_file_if_exists(&pointer).await {
            failures.push(error.to_string());
        }

        if let Err(error) = self.index.remove(&tag, id).await {
            failures.push(format!("index: {error}"));
        }

        debug!(tag = %tag, id, failures = failures.len(), "Removed cache entry");
        BestEffort::from_failures("remove entry", failures)
    }

    /// All live entries.
    ///
    /// Served from the index without touching access times. When the index is
    /// empty or failing, falls back to scanning the filesystem through
    /// [`get`](Self::get).
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<CacheEntry>> {
        match self.index.count().await {
            Ok(count) if count > 0 => match self.list_from_index().await {
                Ok(entries) => return Ok(entries),
                Err(error) => warn!(error = %error, "Index listing failed, scanning disk"),
            },
            Ok(_) => {}
            Err(error) => warn!(error = %error, "Index unavailable, scanning disk"),
        }

        self.list_from_disk().await
    }

    async fn list_from_index(&self) -> Result<Vec<CacheEntry>> {
        let rows = self.index.list_all().await?;
        let now = self.clock.now();
        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(layout) = layout_for_row(&self.resolver, &row) else {
                warn!(tag = %row.tag, id = row.id, folder = %row.folder, "Dropping index row with unsafe folder");
                BestEffort::new(
                    "drop index row",
                    self.index
                        .remove(&row.tag, row.id)
                        .await
                        .map_err(CacheError::from),
                )
                .log();
                continue;
            };
            let paths = layout.paths();
            let mut metadata = CacheMetadata::from_index_row(&row);

            if !exists(&paths.audio).await || metadata.is_expired(now, self.config.ttl) {
                debug!(tag = %row.tag, id = row.id, "Dropping stale entry during listing");
                self.remove(&row.tag, row.id).await.log();
                continue;
            }

            if let Ok(stored) = read_metadata(&paths.metadata).await {
                metadata.title = stored.title;
                metadata.artists = stored.artists;
                metadata.album = stored.album;
            }

            entries.push(self.build_entry(&paths, metadata).await);
        }

        Ok(entries)
    }

    async fn list_from_disk(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        for tag in self.tag_dirs().await? {
            let tag_dir = self.resolver.tag_dir(&tag);
            for id in scan_entry_ids(&tag_dir).await? {
                if let Some(entry) = self.get(&tag, id).await? {
                    entries.push(entry);
                }
            }
        }

        Ok(entries)
    }

    /// Evict least recently used entries until the total size fits the budget.
    #[instrument(skip(self))]
    pub async fn ensure_capacity(&self) -> Result<EvictionReport> {
        self.evict_to_budget(None).await
    }

    async fn evict_to_budget(&self, protect: Option<(&str, i64)>) -> Result<EvictionReport> {
        let max = self.config.max_size_bytes;
        let mut total = self.index.total_size().await?;
        let mut report = EvictionReport {
            total_bytes: total,
            ..EvictionReport::default()
        };

        if max == 0 || total <= max {
            return Ok(report);
        }

        info!(total, max, "Cache over budget, evicting");

        for row in self.index.list_oldest_first().await? {
            if total <= max {
                break;
            }
            if protect.is_some_and(|(tag, id)| row.tag == tag && row.id == id) {
                continue;
            }

            self.remove(&row.tag, row.id).await.log();

            let size = u64::try_from(row.size).unwrap_or(0);
            total = total.saturating_sub(size);
            report.evicted += 1;
            report.freed_bytes += size;
            info!(tag = %row.tag, id = row.id, size, "Evicted cache entry");
        }

        report.total_bytes = total;
        info!(
            evicted = report.evicted,
            freed_bytes = report.freed_bytes,
            total_bytes = report.total_bytes,
            "Eviction complete"
        );
        Ok(report)
    }

    /// Occupancy snapshot from the index.
    pub async fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            entries: self.index.count().await?,
            total_bytes: self.index.total_size().await?,
            max_size_bytes: self.config.max_size_bytes,
        })
    }

    /// Sanitized tag directory names under the base directory.
    pub(crate) async fn tag_dirs(&self) -> Result<Vec<String>> {
        let base = self.resolver.base_dir();
        let mut dir = match fs::read_dir(base).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::io(base)(source)),
        };

        let mut tags = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(CacheError::io(base))? {
            let is_dir = item.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = item.file_name().to_string_lossy().into_owned();
            if is_dir && sanitize_tag(&name) == name {
                tags.push(name);
            }
        }
        tags.sort();
        Ok(tags)
    }

    async fn build_entry(&self, paths: &EntryPaths, metadata: CacheMetadata) -> CacheEntry {
        let lyrics_path = exists(&paths.lyrics).await.then(|| paths.lyrics.clone());
        let cover_path = exists(&paths.cover).await.then(|| paths.cover.clone());
        let transient = self
            .config
            .is_transient(metadata.size, metadata.bitrate_kbps);

        CacheEntry {
            audio_path: paths.audio.clone(),
            metadata_path: paths.metadata.clone(),
            lyrics_path,
            cover_path,
            metadata,
            transient,
        }
    }

    /// Clean up what a re-save left behind at the old location.
    async fn discard_previous(
        &self,
        previous: &EntryLayout,
        pointer: &EntryPointer,
        current: &EntryPaths,
    ) -> BestEffort<()> {
        let old = previous.paths();
        if previous.is_legacy() || old.song_dir != current.song_dir {
            let failures = remove_artifacts(previous).await;
            return BestEffort::from_failures("discard previous entry", failures);
        }

        // Same folder: drop files the new save did not rewrite
        let stale = [
            (old.audio != current.audio).then_some(&old.audio),
            (pointer.lyrics_file.is_none() || old.lyrics != current.lyrics).then_some(&old.lyrics),
            (pointer.cover_file.is_none() || old.cover != current.cover).then_some(&old.cover),
        ];
        let mut failures = Vec::new();
        for path in stale.into_iter().flatten() {
            if let Err(error) = remove_file_if_exists(path).await {
                failures.push(error.to_string());
            }
        }
        BestEffort::from_failures("discard previous entry", failures)
    }
}

/// Fill in what older metadata files leave out, from the resolved layout.
fn normalize_metadata(metadata: &mut CacheMetadata, layout: &EntryLayout, tag: &str, id: i64) {
    metadata.id = id;
    metadata.tag = tag.to_string();

    match layout {
        EntryLayout::LegacyFlat { .. } => {
            metadata.folder = ".".to_string();
            metadata.audio_file = format!("{id}.bin");
        }
        EntryLayout::Folder { pointer, .. } => {
            metadata.folder = pointer.folder.clone();
            metadata.audio_file = pointer.audio_file.clone();
            if metadata.lyrics_file.is_none() {
                metadata.lyrics_file = pointer.lyrics_file.clone();
            }
            if metadata.cover_file.is_none() {
                metadata.cover_file = pointer.cover_file.clone();
            }
        }
    }
}

/// Layout described by an index row; `None` for a folder outside the tag directory.
fn layout_for_row(resolver: &PathResolver, row: &IndexRow) -> Option<EntryLayout> {
    let tag_dir = resolver.tag_dir(&row.tag);
    let id = row.id;
    if row.folder == "." {
        return Some(EntryLayout::LegacyFlat { tag_dir, id });
    }
    if !is_safe_folder(&row.folder) {
        return None;
    }
    Some(EntryLayout::Folder {
        tag_dir,
        id,
        pointer: EntryPointer {
            folder: row.folder.clone(),
            audio_file: row.audio_file.clone(),
            lyrics_file: row.lyrics_file.clone(),
            cover_file: row.cover_file.clone(),
        },
    })
}

/// Delete the files of a layout, excluding its pointer. Returns failure messages.
async fn remove_artifacts(layout: &EntryLayout) -> Vec<String> {
    let paths = layout.paths();
    let mut failures = Vec::new();

    match layout {
        EntryLayout::Folder { tag_dir, .. } => {
            if let Err(error) = remove_dir_if_exists(&paths.song_dir).await {
                failures.push(error.to_string());
            }
            // Only succeeds once the artist has no songs left.
            if let Some(artist_dir) = paths.song_dir.parent() {
                if artist_dir != tag_dir.as_path() {
                    let _ = fs::remove_dir(artist_dir).await;
                }
            }
        }
        EntryLayout::LegacyFlat { .. } => {
            for path in [&paths.audio, &paths.metadata, &paths.lyrics, &paths.cover] {
                if let Err(error) = remove_file_if_exists(path).await {
                    failures.push(error.to_string());
                }
            }
        }
    }

    failures
}

/// Entry ids present in a tag directory, from pointer and legacy metadata files.
pub(crate) async fn scan_entry_ids(tag_dir: &Path) -> Result<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    let mut dir = fs::read_dir(tag_dir).await.map_err(CacheError::io(tag_dir))?;

    while let Some(item) = dir.next_entry().await.map_err(CacheError::io(tag_dir))? {
        let name = item.file_name().to_string_lossy().into_owned();
        let stem = name
            .strip_suffix(POINTER_SUFFIX)
            .or_else(|| name.strip_suffix(".json"));
        if let Some(id) = stem.and_then(|s| s.parse::<i64>().ok()) {
            ids.insert(id);
        }
    }

    Ok(ids)
}

pub(crate) async fn read_metadata(path: &Path) -> Result<CacheMetadata> {
    let raw = fs::read(path).await.map_err(CacheError::io(path))?;
    serde_json::from_slice(&raw).map_err(|e| CacheError::InvalidMetadata {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| CacheError::InvalidMetadata {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, body).await.map_err(CacheError::io(path))
}

async fn write_stream(path: &Path, stream: &mut Box<DynAsyncRead>) -> Result<u64> {
    let mut file = fs::File::create(path).await.map_err(CacheError::io(path))?;
    let written = tokio::io::copy(stream, &mut file)
        .await
        .map_err(CacheError::io(path))?;
    file.flush().await.map_err(CacheError::io(path))?;
    file.sync_all().await.map_err(CacheError::io(path))?;
    Ok(written)
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::io(path)(source)),
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::io(path)(source)),
    }
}

fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".MP3"), "mp3");
        assert_eq!(normalize_extension(" flac "), "flac");
        assert_eq!(normalize_extension(""), "bin");
        assert_eq!(normalize_extension("."), "bin");
    }

    #[tokio::test]
    async fn test_scan_entry_ids() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.index.json", "2.json", "1.json", "abc.json", "3.bin", "x.index.json"] {
            fs::write(dir.path().join(name), b"{}").await.unwrap();
        }

        let ids = scan_entry_ids(dir.path()).await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_layout_for_row() {
        let resolver = PathResolver::new("/c");
        let legacy = IndexRow::new("t", 1, ".", "1.bin", 1, 0);
        assert!(layout_for_row(&resolver, &legacy).unwrap().is_legacy());

        let folder = IndexRow::new("t", 2, "A/B (2)", "B.mp3", 1, 0);
        let paths = layout_for_row(&resolver, &folder).unwrap().paths();
        assert_eq!(paths.audio, Path::new("/c/t/A/B (2)/B.mp3"));

        let escape = IndexRow::new("t", 3, "../x", "x.mp3", 1, 0);
        assert!(layout_for_row(&resolver, &escape).is_none());
    }
}
