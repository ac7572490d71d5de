//! # Audio Metadata
//!
//! Helpers the cache uses around a downloaded audio artifact:
//!
//! - [`probe`]: duration and bitrate of a file on disk
//! - [`tagging`]: best-effort ID3v2 embedding for mp3 downloads
//! - [`mime`]: extension and MIME type tables
//!
//! Both `lofty`-backed operations run on the blocking pool and are exposed
//! through traits so tests and callers can substitute no-op implementations.

pub mod error;
pub mod mime;
pub mod probe;
pub mod tagging;

pub use error::{MetadataError, Result};
pub use probe::{AudioProbe, AudioProperties, LoftyProbe, NoopProbe};
pub use tagging::{Id3TagEmbedder, TagEmbedder, TrackTags};
