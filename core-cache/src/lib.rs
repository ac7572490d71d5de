//! # Audio Download Cache
//!
//! Content-addressed cache of downloaded tracks, keyed by `(tag, id)`.
//!
//! ## Overview
//!
//! - Entries live on disk as an audio file plus `metadata.json`, optional
//!   lyrics and cover, under `<base>/<tag>/<Artist>/<Title> (<id>)/`
//! - A SQLite index mirrors the metadata for listing and size accounting
//! - Entries expire a fixed time after creation
//! - Least recently used entries are evicted once the size budget is exceeded
//! - Low-quality downloads are flagged transient: served once, then deleted
//! - Concurrent misses for the same key share a single download
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     FetchPipeline                      │
//! │  - get_or_fetch()                      │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> CacheStore (hit?)
//!          │      ├──> PathResolver (layouts)
//!          │      ├──> CacheIndex (SQLite)
//!          │      └──> AudioProbe / TagEmbedder
//!          └──> DownloadCoordinator (miss)
//!                 └──> AudioSource.fetch ──> CacheStore.save
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::{CacheConfig, CacheStore, FetchPipeline};
//! use bridge_traits::FetchRequest;
//! use std::sync::Arc;
//!
//! # async fn example(source: Arc<dyn bridge_traits::AudioSource>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CacheStore::open(CacheConfig::new("./cache")).await?);
//! let pipeline = FetchPipeline::new(store, source);
//!
//! let entry = pipeline.get_or_fetch(FetchRequest::new("chill", 1234)).await?;
//! println!("Serving {}", entry.audio_path.display());
//! # Ok(())
//! # }
//! ```

pub mod best_effort;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod paths;
pub mod pipeline;
mod rebuild;
pub mod stats;
pub mod store;

pub use best_effort::BestEffort;
pub use config::CacheConfig;
pub use coordinator::{DownloadCoordinator, SharedResult};
pub use error::{CacheError, Result};
pub use models::{CacheEntry, CacheMetadata, EvictionReport, RebuildReport, SaveRequest};
pub use paths::{sanitize_segment, sanitize_tag, EntryLayout, PathResolver};
pub use pipeline::FetchPipeline;
pub use stats::CacheStats;
pub use store::CacheStore;
