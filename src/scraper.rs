//! HTTP client for the scraper worker.
//!
//! Implements [`ScraperGateway`] by posting the criteria payload as JSON to
//! `POST {scraper.url}/criteria/v1`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including timeouts) → retry
//! - Backoff: 500ms, 1s, 2s, 4s, ... (capped at 2^5 × 500ms)

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use tweet_harness_core::gateway::ScraperGateway;
use tweet_harness_core::models::CriteriaPayload;

use crate::config::ScraperConfig;

/// Why a single dispatch attempt failed.
#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("scraper responded {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("scraper unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ScraperError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Transport(_) => true,
        }
    }
}

/// [`ScraperGateway`] over HTTP.
pub struct HttpScraperGateway {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpScraperGateway {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/criteria/v1", config.url.trim_end_matches('/')),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Override the first backoff step (tests use a few milliseconds).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    async fn send_once(&self, payload: &CriteriaPayload) -> std::result::Result<(), ScraperError> {
        let response = self.client.post(&self.endpoint).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ScraperError::Status { status, body })
    }
}

#[async_trait]
impl ScraperGateway for HttpScraperGateway {
    async fn dispatch(&self, payload: &CriteriaPayload) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.send_once(payload).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.base_delay * (1u32 << attempt.min(5));
                    tracing::debug!(
                        criteria_id = payload.id,
                        attempt,
                        error = %e,
                        "scraper dispatch failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
