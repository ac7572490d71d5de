//! Outbound HTTP as seen by the catalog client.
//!
//! Every upstream call is a GET: JSON lookups go through
//! [`HttpClient::execute`], which buffers the body, while audio goes through
//! [`HttpClient::download_stream`] so it can be written to disk as it arrives.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// Byte stream handed from the network layer to the cache.
pub type DynAsyncRead = dyn tokio::io::AsyncRead + Send + Unpin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    /// Encoded by the client, in insertion order
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    /// Per-request limit on top of the client-wide one
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// First value of a query parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find_map(|(k, v)| (k == name).then_some(v.as_str()))
    }
}

/// Buffered response. Any status is returned as-is; the caller decides what
/// counts as failure.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Response whose body has not been read yet. Only produced for 2xx.
pub struct HttpStream {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Box<DynAsyncRead>,
}

impl HttpStream {
    pub fn content_type(&self) -> Option<&str> {
        header_value(&self.headers, "content-type")
    }
}

impl std::fmt::Debug for HttpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v.as_str()))
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and read the whole body.
    ///
    /// Implementations may retry transient failures (connection errors,
    /// 5xx, 429) before giving up.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Send the request and hand back the body unread.
    ///
    /// Never retried, since bytes may already have reached the caller.
    /// Non-2xx statuses fail with [`BridgeError::UpstreamStatus`](crate::BridgeError::UpstreamStatus).
    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream>;
}
