//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for server and desktop hosts.
//!
//! - `HttpClient` using `reqwest` (rustls, connection pooling, optional proxy)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::time::Duration;
//!
//! let http_client = ReqwestHttpClient::builder()
//!     .timeout(Duration::from_secs(15))
//!     .proxy(std::env::var("NETEASE_PROXY").ok())
//!     .build()?;
//! ```

mod http;

pub use http::{ReqwestHttpClient, ReqwestHttpClientBuilder};
