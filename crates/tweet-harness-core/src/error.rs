//! Sentinel errors shared by every component.
//!
//! Storage backends and the gateway log the underlying cause where it
//! happens and return one of these variants; driver errors never cross a
//! component boundary.

use thiserror::Error;

/// Named failure kinds returned by stores, the enqueue guard, and the
/// ingester.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Read failures
    // =========================================================================
    /// The criteria could not be read (missing row or storage fault).
    #[error("failed to retrieve criteria data")]
    CriteriaRetrievalFailed,

    /// The execution status index could not be read.
    #[error("failed to retrieve executions by statuses")]
    ExecutionsRetrievalFailed,

    // =========================================================================
    // Business rules
    // =========================================================================
    /// A `PENDING` or `IN PROGRESS` execution already exists for the criteria.
    #[error("an execution of this criteria is already enqueued")]
    AlreadyEnqueued,

    /// The request itself is malformed (bad date, unknown status, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Write failures
    // =========================================================================
    /// The scraper worker did not acknowledge the criteria.
    #[error("failed to dispatch criteria to the scraper")]
    DispatchFailed,

    #[error("failed to insert quote")]
    QuoteInsertionFailed,

    #[error("failed to insert tweets")]
    TweetsInsertionFailed,

    #[error("failed to delete orphan quotes")]
    OrphanCleanupFailed,

    #[error("failed to insert criteria")]
    CriteriaInsertionFailed,

    #[error("failed to insert execution")]
    ExecutionInsertionFailed,

    #[error("failed to update execution")]
    ExecutionUpdateFailed,

    #[error("execution not found")]
    ExecutionNotFound,
}

impl Error {
    /// Stable machine-readable name, used as the HTTP error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CriteriaRetrievalFailed => "criteria_retrieval_failed",
            Self::ExecutionsRetrievalFailed => "executions_retrieval_failed",
            Self::AlreadyEnqueued => "already_enqueued",
            Self::InvalidInput(_) => "bad_request",
            Self::DispatchFailed => "dispatch_failed",
            Self::QuoteInsertionFailed => "quote_insertion_failed",
            Self::TweetsInsertionFailed => "tweets_insertion_failed",
            Self::OrphanCleanupFailed => "orphan_cleanup_failed",
            Self::CriteriaInsertionFailed => "criteria_insertion_failed",
            Self::ExecutionInsertionFailed => "execution_insertion_failed",
            Self::ExecutionUpdateFailed => "execution_update_failed",
            Self::ExecutionNotFound => "not_found",
        }
    }

    /// Whether repeating the same call could succeed.
    ///
    /// Business-rule rejections and malformed input are final; storage and
    /// dispatch faults are transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::AlreadyEnqueued | Self::InvalidInput(_) | Self::ExecutionNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
