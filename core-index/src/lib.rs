//! # Cache Index
//!
//! Durable SQLite index of cached entries, keyed by `(tag, id)`.
//!
//! ## Overview
//!
//! The index answers the questions the cache asks often and cheaply: how
//! many entries exist, how many bytes they occupy, and which entry was used
//! least recently. The per-entry `metadata.json` files remain the source of
//! truth for descriptive fields; the index can be rebuilt from them.
//!
//! ## Components
//!
//! - [`db`]: pool creation and migrations
//! - [`CacheIndex`]: repository trait consumed by the cache store
//! - [`SqliteCacheIndex`]: `sqlx` implementation
//! - [`IndexRow`]: typed row model

pub mod db;
pub mod error;
pub mod models;
pub mod repository;

pub use db::{create_pool, DatabaseConfig, IndexLocation};
pub use error::{IndexError, Result};
pub use models::IndexRow;
pub use repository::{CacheIndex, SqliteCacheIndex};
