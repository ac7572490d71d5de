//! # Core Service
//!
//! HTTP surface of the cache. Routes stream cached audio with range support,
//! list cache contents and pass catalog lookups through to NetEase.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /api/health` | Liveness and cache directory |
//! | `GET /api/songs/{id}/stream` | Serve inline, fetching on a miss |
//! | `GET /api/songs/{id}/download` | Serve as an attachment, fetching on a miss |
//! | `GET /api/cache` | Cached entries |
//! | `GET /api/cache/stats` | Entry count and bytes against the budget |
//! | `GET /api/search` | Catalog search |
//! | `GET /api/songs/{id}`, `/lyrics` | Song detail and lyrics |
//! | `GET /api/playlists/{id}`, `/tracks` | Playlist detail and tracks |
//!
//! Stream and download accept `?tag=` and `?br=`; the `x-netease-cookie` and
//! `x-real-ip` headers override the configured upstream credentials.

pub mod error;
pub mod handlers;
pub mod range;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::{cache_config, AppState};
