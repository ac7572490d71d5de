//! NetEase API response types
//!
//! Only the fields the cache uses are modelled; everything else in the
//! payloads is ignored.

use serde::Deserialize;

/// Response of `/song/url`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongUrlResponse {
    #[serde(default)]
    pub data: Vec<SongUrl>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongUrl {
    pub url: Option<String>,
    /// Bitrate in bits per second
    pub br: Option<f64>,
    /// Container type as reported by the API, e.g. `flac` or `mp3`
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Response of `/song/detail`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongDetailResponse {
    #[serde(default)]
    pub songs: Vec<SongDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongDetail {
    pub name: Option<String>,
    #[serde(default)]
    pub ar: Vec<Artist>,
    pub al: Option<Album>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub name: Option<String>,
    pub pic_url: Option<String>,
}

/// Response of `/lyric`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricResponse {
    pub lrc: Option<LyricBlock>,
    pub tlyric: Option<LyricBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricBlock {
    pub lyric: Option<String>,
}

impl LyricResponse {
    /// Original lyrics, falling back to the translation.
    pub fn best(self) -> Option<String> {
        let non_empty = |block: Option<LyricBlock>| {
            block
                .and_then(|b| b.lyric)
                .filter(|text| !text.trim().is_empty())
        };
        non_empty(self.lrc).or_else(|| non_empty(self.tlyric))
    }
}
