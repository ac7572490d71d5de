use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to probe audio: {0}")]
    ProbeFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write tags: {0}")]
    TagWriteFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
