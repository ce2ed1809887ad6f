//! Outbound hand-off to the scraper worker.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::CriteriaPayload;

/// Sink that hands a criteria to the external scraping worker.
///
/// Any `Err` is treated as one opaque dispatch failure by the caller.
/// Retry and backoff, if any, belong to the implementation.
#[async_trait]
pub trait ScraperGateway: Send + Sync {
    async fn dispatch(&self, payload: &CriteriaPayload) -> Result<()>;
}
