//! Logging bootstrap.
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG` when it
//! is set, otherwise by the `[logging]` section of the config. Components
//! log through the `tracing` macros and never hold a logger handle.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Minimum level to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            "off" | "none" => Ok(Self::Off),
            _ => Err(format!("invalid log level: {}", s)),
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("invalid log format: {}", s)),
        }
    }
}

/// Build the filter directive for `level`. sqlx statement logging is kept
/// at `warn` so debug runs stay readable.
fn filter_directive(level: LogLevel) -> String {
    match level {
        LogLevel::Off => "off".to_string(),
        other => format!("{},sqlx=warn", other.as_directive()),
    }
}

/// Install the global subscriber. `prod` caps the level at `info`.
///
/// Calling it more than once is harmless; later calls are ignored.
pub fn init_logging(config: &LoggingConfig, prod: bool) {
    let mut level = config.level.parse().unwrap_or(LogLevel::Debug);
    if prod && matches!(level, LogLevel::Debug | LogLevel::Trace) {
        level = LogLevel::Info;
    }
    let format = config.format.parse().unwrap_or(LogFormat::Compact);

    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directive(level))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
            .ok(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .ok(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .ok(),
    };
}
