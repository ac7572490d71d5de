//! Extension and MIME type tables for audio and cover art.

/// (extension, mime) pairs. The first entry for a MIME type is its canonical extension.
const TABLE: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("flac", "audio/x-flac"),
    ("ape", "audio/ape"),
    ("ape", "audio/x-ape"),
    ("m4a", "audio/mp4"),
    ("m4a", "audio/x-m4a"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("wav", "audio/x-wav"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("lrc", "text/plain"),
    ("json", "application/json"),
    ("bin", "application/octet-stream"),
];

/// MIME type for a file extension (case-insensitive, leading dot allowed).
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Canonical extension for a MIME type; parameters such as `; charset=` are ignored.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(_, m)| *m == essence)
        .map(|(ext, _)| *ext)
}

/// Extension of the last path segment of a URL, ignoring query and fragment.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("mp3"), Some("audio/mpeg"));
        assert_eq!(mime_for_extension(".FLAC"), Some("audio/flac"));
        assert_eq!(mime_for_extension("xyz"), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/x-flac"), Some("flac"));
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("Image/PNG; charset=binary"), Some("png"));
        assert_eq!(extension_for_mime("application/x-unknown"), None);
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            extension_from_url("http://m701.music.126.net/a/b/c.flac?authSecret=1"),
            Some("flac".to_string())
        );
        assert_eq!(
            extension_from_url("https://cdn.example/x/Track.MP3#t=1"),
            Some("mp3".to_string())
        );
        assert_eq!(extension_from_url("https://cdn.example/stream"), None);
        assert_eq!(extension_from_url("https://cdn.example/.hidden"), None);
    }
}
