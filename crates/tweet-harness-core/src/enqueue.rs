//! Enqueue guard.
//!
//! Decides whether a criteria may be handed to the scraper and, if so,
//! dispatches it:
//!
//! ```text
//! get_criteria ──▶ (forced?) ──no──▶ executions_by_statuses(ACTIVE)
//!                     │                      │
//!                    yes             any for this criteria? ──▶ AlreadyEnqueued
//!                     ▼                      │ no
//!                 dispatch ◀─────────────────┘
//! ```
//!
//! The status check and the dispatch are separate round trips, so two
//! concurrent non-forced calls for the same criteria can both pass the
//! check. The SQLite schema closes that window for execution rows with a
//! partial unique index; see `DESIGN.md`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gateway::ScraperGateway;
use crate::models::{CriteriaPayload, ExecutionStatus};
use crate::store::{CriteriaStore, ExecutionStore};

/// Guards dispatches so a criteria is not scraped twice at once.
pub struct EnqueueGuard {
    criteria: Arc<dyn CriteriaStore>,
    executions: Arc<dyn ExecutionStore>,
    gateway: Arc<dyn ScraperGateway>,
}

impl EnqueueGuard {
    pub fn new(
        criteria: Arc<dyn CriteriaStore>,
        executions: Arc<dyn ExecutionStore>,
        gateway: Arc<dyn ScraperGateway>,
    ) -> Self {
        Self {
            criteria,
            executions,
            gateway,
        }
    }

    /// Dispatch `criteria_id` to the scraper.
    ///
    /// Unless `forced`, fails with [`Error::AlreadyEnqueued`] when the
    /// criteria has a `PENDING` or `IN PROGRESS` execution; the gateway is
    /// not called in that case.
    pub async fn enqueue(&self, criteria_id: i64, forced: bool) -> Result<()> {
        let criteria = self.criteria.get_criteria(criteria_id).await?;

        if !forced {
            let active = self
                .executions
                .executions_by_statuses(&ExecutionStatus::ACTIVE)
                .await?;

            if active.iter().any(|e| e.search_criteria_id == criteria_id) {
                tracing::warn!(criteria_id, "criteria already has an active execution");
                return Err(Error::AlreadyEnqueued);
            }
        }

        let payload = CriteriaPayload::from(&criteria);
        if let Err(e) = self.gateway.dispatch(&payload).await {
            tracing::error!(criteria_id, error = %e, "scraper dispatch failed");
            return Err(Error::DispatchFailed);
        }

        tracing::info!(criteria_id, forced, "criteria dispatched to scraper");
        Ok(())
    }

    /// Re-dispatch the criteria of every active execution, e.g. after a
    /// restart lost the scraper's in-flight work.
    ///
    /// Dispatches are forced because the execution already exists. Each
    /// criteria is sent once even if it has several active executions. The
    /// first failure aborts the run and is returned unchanged
    /// (`ExecutionsRetrievalFailed`, `CriteriaRetrievalFailed` or
    /// `DispatchFailed`); there is no separate resume-level sentinel.
    /// Returns the number of criteria dispatched.
    pub async fn resume(&self) -> Result<usize> {
        let active = self
            .executions
            .executions_by_statuses(&ExecutionStatus::ACTIVE)
            .await?;

        let mut dispatched = BTreeSet::new();
        for execution in &active {
            if !dispatched.insert(execution.search_criteria_id) {
                continue;
            }
            self.enqueue(execution.search_criteria_id, true).await?;
        }

        tracing::info!(count = dispatched.len(), "resumed active executions");
        Ok(dispatched.len())
    }
}
