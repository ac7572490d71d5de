use bridge_traits::error::BridgeError;
use core_index::IndexError;
use core_metadata::MetadataError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Invalid metadata at {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Source error: {0}")]
    Source(#[from] BridgeError),

    #[error("Cleanup incomplete: {0}")]
    Cleanup(String),

    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Adapter for `map_err` on filesystem calls.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
        move |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
