use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::{LogFormat, LogLevel};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Where and how the scraper worker is reached.
#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    /// Base URL of the worker, e.g. `http://127.0.0.1:8091`.
    pub url: String,
    #[serde(default = "default_scraper_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_scraper_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.request_timeout_secs == 0 {
        anyhow::bail!("server.request_timeout_secs must be > 0");
    }

    let url = config.scraper.url.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("scraper.url must start with http:// or https:// (got '{}')", url);
    }
    if config.scraper.timeout_secs == 0 {
        anyhow::bail!("scraper.timeout_secs must be > 0");
    }

    config
        .logging
        .level
        .parse::<LogLevel>()
        .map_err(|e| anyhow::anyhow!("logging.level: {}", e))?;
    config
        .logging
        .format
        .parse::<LogFormat>()
        .map_err(|e| anyhow::anyhow!("logging.format: {}", e))?;

    Ok(())
}
