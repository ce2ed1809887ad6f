//! Storage abstraction for Tweet Harness.
//!
//! Each trait is one narrow collaborator of the enqueue guard or the
//! ingester, so a component only depends on the reads and writes it
//! performs. A single backend (SQLite, in-memory) usually implements all
//! of them.
//!
//! Implementations must be `Send + Sync` and must translate backend
//! failures into the sentinel [`Error`](crate::Error) variants documented
//! on each method.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Criteria, Execution, ExecutionStatus, NewCriteria, NewTweet, QuotePayload};

/// Criteria repository.
#[async_trait]
pub trait CriteriaStore: Send + Sync {
    /// Read one criteria by id.
    ///
    /// Fails with `CriteriaRetrievalFailed` on any storage error, including
    /// a missing row.
    async fn get_criteria(&self, id: i64) -> Result<Criteria>;

    /// Store a new criteria definition and return its id.
    ///
    /// Fails with `InvalidInput` when validation rejects the definition and
    /// `CriteriaInsertionFailed` on storage errors.
    async fn insert_criteria(&self, criteria: &NewCriteria) -> Result<i64>;
}

/// Execution status index and lifecycle writes.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// All executions whose status is one of `statuses`, in storage order.
    ///
    /// Fails with `ExecutionsRetrievalFailed`.
    async fn executions_by_statuses(&self, statuses: &[ExecutionStatus]) -> Result<Vec<Execution>>;

    /// Single-status convenience over [`executions_by_statuses`](Self::executions_by_statuses).
    async fn executions_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>> {
        self.executions_by_statuses(&[status]).await
    }

    /// Record a `PENDING` execution for `criteria_id`.
    ///
    /// Fails with `AlreadyEnqueued` when the criteria already has an active
    /// execution and `ExecutionInsertionFailed` otherwise.
    async fn insert_execution(&self, criteria_id: i64) -> Result<i64>;

    /// Move an execution to `status`.
    ///
    /// Fails with `ExecutionNotFound` for unknown ids, `AlreadyEnqueued` when
    /// reactivating would leave two active executions for one criteria, and
    /// `ExecutionUpdateFailed` on storage errors.
    async fn update_execution_status(&self, id: i64, status: ExecutionStatus) -> Result<()>;
}

/// Quote store and orphan reaper.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Insert a quote, or return the id of the existing row with the same
    /// fingerprint.
    ///
    /// Fails with `QuoteInsertionFailed`.
    async fn upsert_quote(&self, quote: &QuotePayload) -> Result<i64>;

    /// Delete every quote in `ids` that no tweet references. Quotes outside
    /// `ids` are never examined. Returns the number of rows removed.
    ///
    /// Fails with `OrphanCleanupFailed`.
    async fn delete_orphan_quotes(&self, ids: &BTreeSet<i64>) -> Result<u64>;
}

/// Tweet bulk writer.
#[async_trait]
pub trait TweetStore: Send + Sync {
    /// Insert all `tweets` atomically, skipping rows whose
    /// `(hash, search_criteria_id)` pair is already stored or appears
    /// earlier in the same batch. Returns the number of rows written.
    ///
    /// Fails with `TweetsInsertionFailed`, in which case nothing from the
    /// batch is visible.
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<u64>;
}
