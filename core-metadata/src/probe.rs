//! Audio property probing
//!
//! Reads duration and bitrate from a downloaded file using `lofty`. Parsing
//! is synchronous, so it runs on the blocking pool.

use async_trait::async_trait;
use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MetadataError, Result};

/// Audio properties of a file on disk
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioProperties {
    /// Duration in seconds
    pub duration_seconds: Option<f64>,
    /// Overall audio bitrate in kbps
    pub bitrate_kbps: Option<u32>,
}

/// Reads audio properties from a file
#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<AudioProperties>;
}

/// [`AudioProbe`] backed by `lofty`
#[derive(Debug, Clone, Default)]
pub struct LoftyProbe;

impl LoftyProbe {
    pub fn new() -> Self {
        Self
    }

    fn probe_blocking(path: &Path) -> Result<AudioProperties> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()));
        }

        let tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::ProbeFailed(format!("Failed to open file: {}", e)))?
            .guess_file_type()
            .map_err(|e| MetadataError::ProbeFailed(format!("Failed to probe file: {}", e)))?
            .read()
            .map_err(|e| MetadataError::UnsupportedFormat(format!("Failed to parse file: {}", e)))?;

        let properties = tagged_file.properties();
        let duration = properties.duration();

        Ok(AudioProperties {
            duration_seconds: (!duration.is_zero()).then(|| duration.as_secs_f64()),
            bitrate_kbps: properties.audio_bitrate().filter(|b| *b > 0),
        })
    }
}

#[async_trait]
impl AudioProbe for LoftyProbe {
    async fn probe(&self, path: &Path) -> Result<AudioProperties> {
        let owned: PathBuf = path.to_path_buf();
        let properties = tokio::task::spawn_blocking(move || Self::probe_blocking(&owned))
            .await
            .map_err(|e| MetadataError::Task(e.to_string()))??;

        debug!(
            path = %path.display(),
            duration = ?properties.duration_seconds,
            bitrate = ?properties.bitrate_kbps,
            "Probed audio properties"
        );
        Ok(properties)
    }
}

/// Probe that reports nothing, for callers that skip probing
#[derive(Debug, Clone, Default)]
pub struct NoopProbe;

#[async_trait]
impl AudioProbe for NoopProbe {
    async fn probe(&self, _path: &Path) -> Result<AudioProperties> {
        Ok(AudioProperties::default())
    }
}
