use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream};
use futures_util::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("tunecache/", env!("CARGO_PKG_VERSION"));

/// [`HttpClient`] backed by a pooled `reqwest` client.
///
/// Buffered calls are retried with doubling backoff on connection errors,
/// 5xx and 429. Streaming downloads get exactly one attempt.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    attempts: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ReqwestHttpClientBuilder {
        ReqwestHttpClientBuilder::default()
    }

    fn prepare(&self, request: HttpRequest) -> RequestBuilder {
        let mut builder = self.client.get(&request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    /// Delay before attempt `attempt + 1`, counting from 1.
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn send_error(url: &str, e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Timeout(url.to_string())
    } else if e.is_connect() {
        BridgeError::OperationFailed(format!("Connection to {} failed: {}", url, e))
    } else {
        BridgeError::OperationFailed(format!("Request to {} failed: {}", url, e))
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let mut attempt = 1;

        loop {
            let failure = match self.prepare(request.clone()).send().await {
                Ok(response) if is_retryable(response.status()) => {
                    let status = response.status().as_u16();
                    BridgeError::UpstreamStatus {
                        status,
                        message: format!("{} is unavailable", url),
                    }
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers = header_map(response.headers());
                    let body = response.bytes().await.map_err(|e| send_error(&url, e))?;
                    debug!(url = %url, status, bytes = body.len(), "Upstream call finished");
                    return Ok(HttpResponse {
                        status,
                        headers,
                        body,
                    });
                }
                Err(e) => send_error(&url, e),
            };

            if attempt >= self.attempts {
                return Err(failure);
            }
            let delay = self.delay_after(attempt);
            warn!(url = %url, attempt, error = %failure, delay_ms = delay.as_millis() as u64, "Retrying upstream call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<HttpStream> {
        let url = request.url.clone();
        let response = self
            .prepare(request)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::UpstreamStatus {
                status: status.as_u16(),
                message: format!("download of {} failed", url),
            });
        }
        debug!(url = %url, length = ?response.content_length(), "Download started");

        let headers = header_map(response.headers());
        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        Ok(HttpStream {
            status: status.as_u16(),
            headers,
            body: Box::new(body),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestHttpClientBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    proxy: Option<String>,
    attempts: u32,
    backoff: Duration,
}

impl Default for ReqwestHttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            proxy: None,
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl ReqwestHttpClientBuilder {
    /// Total time allowed for one request, body included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Send everything through `proxy`. Blank values mean no proxy.
    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    /// Attempts per buffered call, at least one.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<ReqwestHttpClient> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                BridgeError::OperationFailed(format!("Invalid proxy URL '{}': {}", proxy, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(ReqwestHttpClient {
            client,
            attempts: self.attempts,
            backoff: self.backoff,
            max_backoff: Duration::from_secs(5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_client_builds() {
        assert!(ReqwestHttpClient::new().is_ok());
    }

    #[test]
    fn test_blank_proxy_is_ignored() {
        let client = ReqwestHttpClient::builder()
            .proxy(Some("   ".to_string()))
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_prepare_encodes_query_and_headers() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = HttpRequest::get("http://localhost:3000/cloudsearch")
            .query("keywords", "lofi beats")
            .query("realIP", "101.42.0.1")
            .header("Cookie", "MUSIC_U=abc");

        let built = client.prepare(request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::GET);
        assert_eq!(
            built.url().query(),
            Some("keywords=lofi+beats&realIP=101.42.0.1")
        );
        assert_eq!(built.headers()["cookie"], "MUSIC_U=abc");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let client = ReqwestHttpClient::builder()
            .attempts(0)
            .backoff(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(client.attempts, 1);
        assert_eq!(client.delay_after(1), Duration::from_secs(1));
        assert_eq!(client.delay_after(2), Duration::from_secs(2));
        assert_eq!(client.delay_after(3), Duration::from_secs(4));
        assert_eq!(client.delay_after(10), Duration::from_secs(5));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }
}
