//! Tweet batch ingestion.
//!
//! Persists a batch of scraped tweets in three steps:
//!
//! 1. Each embedded quote is upserted on its own. A failed upsert only
//!    drops that tweet's quote reference; the batch goes on.
//! 2. All tweets are written with one atomic bulk insert that skips rows
//!    whose `(hash, search_criteria_id)` pair already exists.
//! 3. Quotes touched by the batch that ended up unreferenced (because
//!    their tweet was a duplicate) are reaped. Reaper failures are logged
//!    and reported in the summary but do not fail the batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{NewTweet, TweetCandidate};
use crate::store::{QuoteStore, TweetStore};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Candidates received.
    pub received: usize,
    /// Tweet rows written; duplicates are not counted.
    pub inserted: u64,
    /// Distinct quote ids the batch upserted.
    pub quotes_touched: usize,
    /// Quotes whose upsert failed; their tweets were stored without a quote.
    pub quotes_failed: usize,
    /// Touched quotes deleted because no tweet references them.
    pub orphans_removed: u64,
    /// Whether the orphan reaper failed. The batch itself still committed.
    pub orphan_cleanup_failed: bool,
}

/// Writes tweet batches and keeps the quote table free of orphans.
pub struct TweetIngester {
    quotes: Arc<dyn QuoteStore>,
    tweets: Arc<dyn TweetStore>,
}

impl TweetIngester {
    pub fn new(quotes: Arc<dyn QuoteStore>, tweets: Arc<dyn TweetStore>) -> Self {
        Self { quotes, tweets }
    }

    /// Ingest one batch.
    ///
    /// Fails only with [`Error::TweetsInsertionFailed`], in which case no
    /// tweet from the batch was stored and the reaper was not run.
    pub async fn ingest(&self, candidates: &[TweetCandidate]) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            received: candidates.len(),
            ..IngestSummary::default()
        };
        if candidates.is_empty() {
            return Ok(summary);
        }

        let mut touched = BTreeSet::new();
        let mut rows = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let quote_id = match &candidate.quote {
                Some(quote) => match self.quotes.upsert_quote(quote).await {
                    Ok(id) => {
                        touched.insert(id);
                        Some(id)
                    }
                    Err(e) => {
                        tracing::warn!(
                            tweet = %candidate.hash,
                            error = %e,
                            "quote not stored, tweet ingested without it"
                        );
                        summary.quotes_failed += 1;
                        None
                    }
                },
                None => None,
            };
            rows.push(NewTweet::from_candidate(candidate, quote_id));
        }
        summary.quotes_touched = touched.len();

        summary.inserted = self.tweets.insert_tweets(&rows).await.map_err(|e| {
            tracing::error!(batch = rows.len(), error = %e, "tweet batch insert failed");
            Error::TweetsInsertionFailed
        })?;

        if !touched.is_empty() {
            match self.quotes.delete_orphan_quotes(&touched).await {
                Ok(removed) => summary.orphans_removed = removed,
                Err(e) => {
                    tracing::warn!(
                        quotes = touched.len(),
                        error = %e,
                        "orphan quote cleanup failed, batch kept"
                    );
                    summary.orphan_cleanup_failed = true;
                }
            }
        }

        tracing::debug!(
            received = summary.received,
            inserted = summary.inserted,
            orphans_removed = summary.orphans_removed,
            "tweet batch ingested"
        );
        Ok(summary)
    }
}
