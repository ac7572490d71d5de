//! # Server Configuration
//!
//! Environment-sourced configuration for the caching proxy.
//!
//! ## Overview
//!
//! [`ServerConfig::from_env`] reads every recognised variable once at startup,
//! applies defaults and validates the result. Tests use
//! [`ServerConfig::from_lookup`] with a closure instead of touching the process
//! environment.
//!
//! ## Recognised variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` / `PORT` | `0.0.0.0` / `4000` |
//! | `CACHE_DIR` | `./cache` |
//! | `CACHE_MAX_SIZE_MB` (`CACHE_MAX_SIZE_BYTES` wins) | `2048` |
//! | `CACHE_TTL_HOURS` (`CACHE_TTL_MS` wins) | `24` |
//! | `CACHE_MIN_SIZE_MB` | `4` |
//! | `CACHE_MIN_BITRATE_KBPS` | `192` |
//! | `CACHE_EMBED_TAGS` | `true` |
//! | `NETEASE_API_BASE` | `http://localhost:3000` |
//! | `NETEASE_COOKIE` | empty |
//! | `NETEASE_REAL_IP` | `101.42.0.1` |
//! | `NETEASE_PROXY` | unset |
//! | `NETEASE_TIMEOUT_MS` | `15000` |
//! | `LOG_FORMAT` / `LOG_LEVEL` / `RUST_LOG` / `LOG_SPANS` | build default / `info` / unset / `false` |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ServerConfig;
//!
//! dotenvy::dotenv().ok();
//! let config = ServerConfig::from_env()?;
//! println!("caching into {}", config.cache.dir.display());
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;
const HOUR_MS: u64 = 60 * 60 * 1000;

/// Cache sizing and retention settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Base directory holding tag folders and the index database
    pub dir: PathBuf,
    /// Total size budget in bytes. Zero disables eviction.
    pub max_size_bytes: u64,
    /// Entry lifetime. Zero disables expiry.
    pub ttl: Duration,
    /// Entries smaller than this are served once and deleted
    pub min_size_bytes: u64,
    /// Entries with a known bitrate below this are served once and deleted
    pub min_bitrate_kbps: u32,
    /// Write ID3 tags into mp3 downloads
    pub embed_tags: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cache"),
            max_size_bytes: 2048 * MIB,
            ttl: Duration::from_millis(24 * HOUR_MS),
            min_size_bytes: 4 * MIB,
            min_bitrate_kbps: 192,
            embed_tags: true,
        }
    }
}

/// Upstream catalog settings.
#[derive(Clone, PartialEq, Eq)]
pub struct NeteaseSettings {
    pub api_base: String,
    pub cookie: String,
    pub real_ip: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for NeteaseSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3000".to_string(),
            cookie: String::new(),
            real_ip: Some("101.42.0.1".to_string()),
            proxy: None,
            timeout: Duration::from_millis(15_000),
        }
    }
}

impl std::fmt::Debug for NeteaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeteaseSettings")
            .field("api_base", &self.api_base)
            .field(
                "cookie",
                &crate::logging::redact("cookie", &self.cookie),
            )
            .field("real_ip", &self.real_ip)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Top-level configuration for the server and maintenance commands.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cache: CacheSettings,
    pub netease: NeteaseSettings,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            cache: CacheSettings::default(),
            netease: NeteaseSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var::<u16>("PORT", get("PORT"))? {
            config.port = port;
        }

        let cache = &mut config.cache;
        if let Some(dir) = get("CACHE_DIR") {
            cache.dir = PathBuf::from(dir);
        }
        if let Some(bytes) = parse_var::<u64>("CACHE_MAX_SIZE_BYTES", get("CACHE_MAX_SIZE_BYTES"))? {
            cache.max_size_bytes = bytes;
        } else if let Some(mb) = parse_var::<u64>("CACHE_MAX_SIZE_MB", get("CACHE_MAX_SIZE_MB"))? {
            cache.max_size_bytes = mb.saturating_mul(MIB);
        }
        if let Some(ms) = parse_var::<u64>("CACHE_TTL_MS", get("CACHE_TTL_MS"))? {
            cache.ttl = Duration::from_millis(ms);
        } else if let Some(hours) = parse_var::<f64>("CACHE_TTL_HOURS", get("CACHE_TTL_HOURS"))? {
            if !hours.is_finite() || hours < 0.0 {
                return Err(Error::Config(format!(
                    "CACHE_TTL_HOURS must be a non-negative number, got {}",
                    hours
                )));
            }
            cache.ttl = Duration::from_millis((hours * HOUR_MS as f64).round() as u64);
        }
        if let Some(mb) = parse_var::<f64>("CACHE_MIN_SIZE_MB", get("CACHE_MIN_SIZE_MB"))? {
            if !mb.is_finite() || mb < 0.0 {
                return Err(Error::Config(format!(
                    "CACHE_MIN_SIZE_MB must be a non-negative number, got {}",
                    mb
                )));
            }
            cache.min_size_bytes = (mb * MIB as f64).round() as u64;
        }
        if let Some(kbps) =
            parse_var::<u32>("CACHE_MIN_BITRATE_KBPS", get("CACHE_MIN_BITRATE_KBPS"))?
        {
            cache.min_bitrate_kbps = kbps;
        }
        if let Some(embed) = get("CACHE_EMBED_TAGS") {
            cache.embed_tags = parse_bool("CACHE_EMBED_TAGS", &embed)?;
        }

        let netease = &mut config.netease;
        if let Some(base) = get("NETEASE_API_BASE") {
            netease.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(cookie) = get("NETEASE_COOKIE") {
            netease.cookie = cookie;
        }
        if let Some(real_ip) = get("NETEASE_REAL_IP") {
            netease.real_ip = Some(real_ip);
        }
        netease.proxy = get("NETEASE_PROXY");
        if let Some(ms) = parse_var::<u64>("NETEASE_TIMEOUT_MS", get("NETEASE_TIMEOUT_MS"))? {
            netease.timeout = Duration::from_millis(ms);
        }

        if let Some(format) = get("LOG_FORMAT") {
            config.logging.format = format.parse::<LogFormat>()?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.logging.level = level.parse::<LogLevel>().map_err(|reason| Error::InvalidValue {
                key: "LOG_LEVEL".to_string(),
                value: level.clone(),
                reason,
            })?;
        }
        if let Some(filter) = get("RUST_LOG") {
            config.logging.filter = Some(filter);
        }
        if let Some(spans) = get("LOG_SPANS") {
            config.logging.span_events = parse_bool("LOG_SPANS", &spans)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache.dir = dir.into();
        self
    }

    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.cache.max_size_bytes = bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.netease.api_base = api_base.into();
        self
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates the configuration and returns an actionable error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache.dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "CACHE_DIR cannot be empty. Point it at a writable directory.".to_string(),
            ));
        }

        if !(self.netease.api_base.starts_with("http://")
            || self.netease.api_base.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "NETEASE_API_BASE must be an http(s) URL, got '{}'",
                self.netease.api_base
            )));
        }

        if self.netease.timeout.is_zero() {
            return Err(Error::Config(
                "NETEASE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(Error::Config("HOST cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|e| Error::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
                value: raw,
            })
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean (true/false)".to_string(),
        }),
    }
}
