//! Path layout for cached entries
//!
//! Two on-disk layouts coexist under `<base>/<tag>/`:
//!
//! ```text
//! <tag>/
//! ├── <id>.index.json              folder layout pointer
//! ├── <Artist>/<Title> (<id>)/
//! │   ├── <Title>.<ext>
//! │   ├── <Title>.lrc
//! │   ├── cover.jpg
//! │   └── metadata.json
//! ├── <id>.bin                     legacy flat layout
//! ├── <id>.json
//! ├── <id>.lrc
//! └── <id>.cover
//! ```
//!
//! New entries are always written in the folder layout; the legacy layout is
//! only ever read and removed.

use bridge_traits::TrackInfo;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Per-entry metadata file inside a folder-layout entry directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Cover file name used when the source does not provide one.
pub const DEFAULT_COVER_FILE: &str = "cover.jpg";

/// Suffix of the pointer file sitting next to the tag's entry folders.
pub const POINTER_SUFFIX: &str = ".index.json";

const MAX_SEGMENT_CHARS: usize = 80;

/// Map an arbitrary tag to a filesystem-safe namespace.
///
/// Lowercases, replaces every run of characters outside `[a-z0-9_-]` with a
/// single dash, collapses dashes and trims them from both ends. An empty
/// result becomes `untagged`.
pub fn sanitize_tag(tag: &str) -> String {
    let lowered = tag.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());

    for ch in lowered.chars() {
        let allowed = ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-';
        let next = if allowed { ch } else { '-' };
        if next == '-' && out.ends_with('-') {
            continue;
        }
        out.push(next);
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "untagged".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Make a human-readable string usable as one path segment.
pub fn sanitize_segment(value: &str, fallback: &str) -> String {
    let source = if value.is_empty() { fallback } else { value };

    let replaced: String = source
        .trim()
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    // Whitespace exposed by stripping dots or truncating is kept
    let truncated: String = collapsed
        .trim_matches('.')
        .chars()
        .take(MAX_SEGMENT_CHARS)
        .collect();

    if truncated.is_empty() {
        fallback.to_string()
    } else {
        truncated
    }
}

/// Contents of `<tag>/<id>.index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointer {
    /// Entry folder relative to the tag directory, `/`-separated
    #[serde(default)]
    pub folder: String,
    /// Audio file name inside the folder
    #[serde(default)]
    pub audio_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_file: Option<String>,
}

/// Every path belonging to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    pub tag_dir: PathBuf,
    /// Entry directory; equals `tag_dir` for legacy entries
    pub song_dir: PathBuf,
    pub audio: PathBuf,
    pub metadata: PathBuf,
    pub lyrics: PathBuf,
    pub cover: PathBuf,
    pub pointer: PathBuf,
}

/// Which layout an existing entry was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLayout {
    Folder {
        tag_dir: PathBuf,
        id: i64,
        pointer: EntryPointer,
    },
    LegacyFlat {
        tag_dir: PathBuf,
        id: i64,
    },
}

impl EntryLayout {
    pub fn is_legacy(&self) -> bool {
        matches!(self, EntryLayout::LegacyFlat { .. })
    }

    pub fn paths(&self) -> EntryPaths {
        match self {
            EntryLayout::Folder {
                tag_dir,
                id,
                pointer,
            } => {
                let song_dir = join_folder(tag_dir, &pointer.folder);
                let audio = song_dir.join(&pointer.audio_file);
                let lyrics_file = pointer.lyrics_file.clone().unwrap_or_else(|| {
                    format!("{}.lrc", file_stem(&pointer.audio_file))
                });
                let cover_file = pointer
                    .cover_file
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COVER_FILE.to_string());

                EntryPaths {
                    tag_dir: tag_dir.clone(),
                    metadata: song_dir.join(METADATA_FILE),
                    lyrics: song_dir.join(lyrics_file),
                    cover: song_dir.join(cover_file),
                    pointer: pointer_path(tag_dir, *id),
                    song_dir,
                    audio,
                }
            }
            EntryLayout::LegacyFlat { tag_dir, id } => EntryPaths {
                tag_dir: tag_dir.clone(),
                song_dir: tag_dir.clone(),
                audio: tag_dir.join(format!("{id}.bin")),
                metadata: tag_dir.join(format!("{id}.json")),
                lyrics: tag_dir.join(format!("{id}.lrc")),
                cover: tag_dir.join(format!("{id}.cover")),
                pointer: pointer_path(tag_dir, *id),
            },
        }
    }
}

/// Where a new entry will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlan {
    pub pointer: EntryPointer,
    pub paths: EntryPaths,
    /// Download target, renamed onto `paths.audio` once complete
    pub temp_audio: PathBuf,
}

/// Maps `(tag, id)` to on-disk locations under the base directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl PathResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for an already-sanitized tag.
    pub fn tag_dir(&self, tag: &str) -> PathBuf {
        self.base_dir.join(tag)
    }

    /// Locate an existing entry. The folder layout wins over the legacy one.
    ///
    /// A pointer that cannot be read, or that names an unsafe folder, is
    /// treated as absent.
    pub async fn resolve(&self, tag: &str, id: i64) -> Option<EntryLayout> {
        let tag_dir = self.tag_dir(tag);
        let pointer_file = pointer_path(&tag_dir, id);

        if exists(&pointer_file).await {
            match read_pointer(&pointer_file).await {
                Ok(pointer) if is_safe_folder(&pointer.folder) && !pointer.audio_file.is_empty() => {
                    return Some(EntryLayout::Folder {
                        tag_dir,
                        id,
                        pointer,
                    });
                }
                Ok(pointer) => {
                    warn!(
                        path = %pointer_file.display(),
                        folder = %pointer.folder,
                        "Ignoring pointer with unsafe folder"
                    );
                }
                Err(error) => {
                    warn!(path = %pointer_file.display(), error = %error, "Unreadable entry pointer");
                }
            }
        }

        if exists(&tag_dir.join(format!("{id}.json"))).await {
            return Some(EntryLayout::LegacyFlat { tag_dir, id });
        }

        None
    }

    /// Compute the folder-layout location for a new entry.
    pub fn plan(
        &self,
        tag: &str,
        id: i64,
        info: &TrackInfo,
        extension: &str,
        has_lyrics: bool,
        cover_file: Option<&str>,
    ) -> EntryPlan {
        let artist = info
            .artists
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Artist");
        let artist = sanitize_segment(artist, "artist");

        let default_title = format!("Song-{id}");
        let title = info.title.as_deref().unwrap_or(&default_title);
        let title = sanitize_segment(title, "unknown");

        let pointer = EntryPointer {
            folder: format!("{artist}/{title} ({id})"),
            audio_file: format!("{title}.{extension}"),
            lyrics_file: has_lyrics.then(|| format!("{title}.lrc")),
            cover_file: cover_file.map(|name| sanitize_segment(name, DEFAULT_COVER_FILE)),
        };

        let layout = EntryLayout::Folder {
            tag_dir: self.tag_dir(tag),
            id,
            pointer: pointer.clone(),
        };
        let paths = layout.paths();

        let mut temp = paths.audio.clone().into_os_string();
        temp.push(".tmp");

        EntryPlan {
            pointer,
            paths,
            temp_audio: PathBuf::from(temp),
        }
    }
}

/// `<tag_dir>/<id>.index.json`
pub fn pointer_path(tag_dir: &Path, id: i64) -> PathBuf {
    tag_dir.join(format!("{id}{POINTER_SUFFIX}"))
}

/// Join a `/`-separated relative folder onto `tag_dir`.
pub fn join_folder(tag_dir: &Path, folder: &str) -> PathBuf {
    folder
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .fold(tag_dir.to_path_buf(), |path, segment| path.join(segment))
}

/// Folders must stay strictly below the tag directory.
pub fn is_safe_folder(folder: &str) -> bool {
    let trimmed = folder.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed.starts_with('/') {
        return false;
    }
    let path = Path::new(trimmed);
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !trimmed.split(['/', '\\']).any(|segment| segment == "..")
}

pub(crate) async fn read_pointer(path: &Path) -> std::io::Result<EntryPointer> {
    let raw = tokio::fs::read(path).await?;
    serde_json::from_slice(&raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub(crate) async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(pos) => &file_name[..pos],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("My Playlist!"), "my-playlist");
        assert_eq!(sanitize_tag("  Chill__Mix "), "chill__mix");
        assert_eq!(sanitize_tag("--a---b--"), "a-b");
        assert_eq!(sanitize_tag("日本語"), "untagged");
        assert_eq!(sanitize_tag(""), "untagged");
        assert_eq!(sanitize_tag("!!!"), "untagged");
    }

    #[test]
    fn test_sanitize_tag_is_idempotent() {
        for tag in ["My Playlist!", "a b c", "UPPER-case_9", "", "..//.."] {
            let once = sanitize_tag(tag);
            assert_eq!(sanitize_tag(&once), once);
        }
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("AC/DC", "artist"), "AC-DC");
        assert_eq!(sanitize_segment("  What?  Why:  ", "x"), "What- Why-");
        assert_eq!(sanitize_segment("...hidden...", "x"), "hidden");
        assert_eq!(sanitize_segment("", "fallback"), "fallback");
        assert_eq!(sanitize_segment("...", "fallback"), "fallback");
        assert_eq!(sanitize_segment("... x", "fallback"), " x");
        assert_eq!(sanitize_segment("a\tb\n c", "x"), "a b c");

        let long = "x".repeat(200);
        assert_eq!(sanitize_segment(&long, "x").chars().count(), 80);
    }

    #[test]
    fn test_safe_folder() {
        assert!(is_safe_folder("Artist/Title (1)"));
        assert!(!is_safe_folder(""));
        assert!(!is_safe_folder("."));
        assert!(!is_safe_folder("/etc"));
        assert!(!is_safe_folder("../other"));
        assert!(!is_safe_folder("Artist/../../x"));
    }

    #[test]
    fn test_legacy_paths() {
        let layout = EntryLayout::LegacyFlat {
            tag_dir: PathBuf::from("/c/t"),
            id: 7,
        };
        let paths = layout.paths();
        assert_eq!(paths.song_dir, PathBuf::from("/c/t"));
        assert_eq!(paths.audio, PathBuf::from("/c/t/7.bin"));
        assert_eq!(paths.metadata, PathBuf::from("/c/t/7.json"));
        assert_eq!(paths.lyrics, PathBuf::from("/c/t/7.lrc"));
        assert_eq!(paths.cover, PathBuf::from("/c/t/7.cover"));
        assert_eq!(paths.pointer, PathBuf::from("/c/t/7.index.json"));
    }

    #[test]
    fn test_folder_paths_default_sidecars() {
        let layout = EntryLayout::Folder {
            tag_dir: PathBuf::from("/c/t"),
            id: 7,
            pointer: EntryPointer {
                folder: "Band/Song (7)".to_string(),
                audio_file: "Song.flac".to_string(),
                lyrics_file: None,
                cover_file: None,
            },
        };
        let paths = layout.paths();
        assert_eq!(paths.song_dir, PathBuf::from("/c/t/Band/Song (7)"));
        assert_eq!(paths.audio, PathBuf::from("/c/t/Band/Song (7)/Song.flac"));
        assert_eq!(paths.metadata, PathBuf::from("/c/t/Band/Song (7)/metadata.json"));
        assert_eq!(paths.lyrics, PathBuf::from("/c/t/Band/Song (7)/Song.lrc"));
        assert_eq!(paths.cover, PathBuf::from("/c/t/Band/Song (7)/cover.jpg"));
    }

    #[test]
    fn test_plan_uses_first_artist_and_title() {
        let resolver = PathResolver::new("/c");
        let info = TrackInfo {
            title: Some("Hello: World".to_string()),
            artists: vec!["A/B".to_string(), "Other".to_string()],
            album: None,
            bitrate_kbps: None,
        };

        let plan = resolver.plan("t", 5, &info, "mp3", true, Some("cover.png"));
        assert_eq!(plan.pointer.folder, "A-B/Hello- World (5)");
        assert_eq!(plan.pointer.audio_file, "Hello- World.mp3");
        assert_eq!(plan.pointer.lyrics_file.as_deref(), Some("Hello- World.lrc"));
        assert_eq!(plan.pointer.cover_file.as_deref(), Some("cover.png"));
        assert_eq!(
            plan.temp_audio,
            PathBuf::from("/c/t/A-B/Hello- World (5)/Hello- World.mp3.tmp")
        );
    }

    #[test]
    fn test_plan_defaults_without_info() {
        let resolver = PathResolver::new("/c");
        let plan = resolver.plan("t", 9, &TrackInfo::default(), "bin", false, None);
        assert_eq!(plan.pointer.folder, "Unknown Artist/Song-9 (9)");
        assert_eq!(plan.pointer.audio_file, "Song-9.bin");
        assert!(plan.pointer.lyrics_file.is_none());
        assert!(plan.pointer.cover_file.is_none());
    }

    #[test]
    fn test_pointer_json_shape() {
        let pointer = EntryPointer {
            folder: "A/B (1)".to_string(),
            audio_file: "B.mp3".to_string(),
            lyrics_file: None,
            cover_file: Some("cover.jpg".to_string()),
        };
        let json = serde_json::to_value(&pointer).unwrap();
        assert_eq!(json["audioFile"], "B.mp3");
        assert_eq!(json["coverFile"], "cover.jpg");
        assert!(json.get("lyricsFile").is_none());
    }

    #[tokio::test]
    async fn test_resolve_prefers_pointer_over_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let tag_dir = dir.path().join("t");
        tokio::fs::create_dir_all(&tag_dir).await.unwrap();
        tokio::fs::write(tag_dir.join("3.json"), b"{}").await.unwrap();

        let resolver = PathResolver::new(dir.path());
        assert!(resolver.resolve("t", 3).await.unwrap().is_legacy());

        tokio::fs::write(
            tag_dir.join("3.index.json"),
            br#"{"folder":"A/B (3)","audioFile":"B.mp3"}"#,
        )
        .await
        .unwrap();
        assert!(!resolver.resolve("t", 3).await.unwrap().is_legacy());

        assert!(resolver.resolve("t", 4).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_ignores_bad_pointers() {
        let dir = tempfile::tempdir().unwrap();
        let tag_dir = dir.path().join("t");
        tokio::fs::create_dir_all(&tag_dir).await.unwrap();
        let resolver = PathResolver::new(dir.path());

        tokio::fs::write(tag_dir.join("1.index.json"), b"not json").await.unwrap();
        assert!(resolver.resolve("t", 1).await.is_none());

        tokio::fs::write(
            tag_dir.join("2.index.json"),
            br#"{"folder":"../escape","audioFile":"x.mp3"}"#,
        )
        .await
        .unwrap();
        assert!(resolver.resolve("t", 2).await.is_none());
    }
}
