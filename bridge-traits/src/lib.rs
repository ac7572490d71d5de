//! # Host Bridge Traits
//!
//! Abstraction traits at the seams between the cache core and the outside world.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Buffered calls and streaming downloads
//! - [`AudioSource`](source::AudioSource) - Resolves a track request into audio bytes plus metadata
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Implementations
//!
//! | Trait | Implementation Crate |
//! |-------|---------------------|
//! | `HttpClient` | `bridge-desktop` (`ReqwestHttpClient`) |
//! | `AudioSource` | `provider-netease` (`NeteaseClient`) |
//! | `Clock` | [`SystemClock`](time::SystemClock) |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their own errors into it and keep the message actionable (URL,
//! status, upstream message).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared as `Arc<dyn _>`
//! across tokio tasks.

pub mod error;
pub mod http;
pub mod source;
pub mod time;

pub use error::BridgeError;

pub use http::{DynAsyncRead, HttpClient, HttpRequest, HttpResponse, HttpStream};
pub use source::{AudioSource, CoverArt, FetchRequest, FetchedAudio, RequestOptions, TrackInfo};
pub use time::{Clock, LogLevel, SystemClock};
