//! Workspace facade crate.
//!
//! Re-exports the crates a host needs to embed the cache: the store and
//! fetch pipeline, the NetEase source, and the HTTP router.

pub use core_cache as cache;
pub use core_service as service;
pub use provider_netease as netease;
