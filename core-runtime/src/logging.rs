//! Tracing subscriber setup for the server and the maintenance commands.
//!
//! Output goes to stdout in one of three formats. Workspace crates log at the
//! configured level while HTTP and database internals stay at `warn`, unless a
//! `RUST_LOG`-style filter replaces the whole directive set.
//!
//! ```ignore
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Json)
//!     .with_level(LogLevel::Debug);
//! init_logging(config)?;
//! ```

use crate::error::{Error, Result};

use bridge_traits::time::LogLevel;
use std::borrow::Cow;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const WORKSPACE_TARGETS: &[&str] = &[
    "tunecache_workspace",
    "tunecached",
    "core_runtime",
    "core_index",
    "core_metadata",
    "core_cache",
    "core_service",
    "provider_netease",
    "bridge_desktop",
    "tower_http",
];

const QUIET_TARGETS: &str = "h2=warn,hyper=warn,reqwest=warn,sqlx=warn,lofty=warn";

/// Field names whose values never reach the log output.
const SECRET_FIELDS: &[&str] = &[
    "cookie",
    "token",
    "password",
    "secret",
    "authorization",
    "music_u",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// One JSON object per event
    Json,
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(Error::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                value: s.to_string(),
                reason: "expected pretty, json or compact".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full directive string; replaces the per-crate defaults when set
    pub filter: Option<String>,
    /// Log span open/close, useful for timing requests
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            span_events: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let level = self.level.as_str();
        let mut directives = WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>();
        directives.push(QUIET_TARGETS.to_string());
        directives.join(",")
    }
}

/// Install the global subscriber.
///
/// Fails when the filter does not parse or when a subscriber is already
/// installed in this process.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(output_layer(&config))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {e}")))
}

fn output_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_span_events(spans);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.span_events)
            .with_span_list(config.span_events)
            .boxed(),
    }
}

/// Replace values of credential-like fields with `[REDACTED]`.
///
/// Field names match case-insensitively on substrings, so `x-netease-cookie`
/// counts as a cookie. Empty values stay empty so "not configured" remains
/// visible.
pub fn redact<'a>(field: &str, value: &'a str) -> Cow<'a, str> {
    let field = field.to_ascii_lowercase();
    if !value.is_empty() && SECRET_FIELDS.iter().any(|secret| field.contains(secret)) {
        Cow::Borrowed("[REDACTED]")
    } else {
        Cow::Borrowed(value)
    }
}
