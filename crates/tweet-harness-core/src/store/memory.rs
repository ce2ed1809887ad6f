//! In-memory store implementing every storage trait.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Conflict rules mirror the SQLite
//! schema: quotes are unique by hash, tweets by `(hash, search_criteria_id)`,
//! and each criteria has at most one active execution. Ids come from a
//! per-table counter and are never reused, like `AUTOINCREMENT`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{
    Criteria, Execution, ExecutionStatus, NewCriteria, NewTweet, Quote, QuotePayload, Tweet,
};

use super::{CriteriaStore, ExecutionStore, QuoteStore, TweetStore};

/// In-memory store for tests and embedders.
pub struct InMemoryStore {
    criteria: RwLock<Vec<Criteria>>,
    executions: RwLock<Vec<Execution>>,
    quotes: RwLock<Vec<Quote>>,
    tweets: RwLock<Vec<Tweet>>,
    criteria_seq: Sequence,
    execution_seq: Sequence,
    quote_seq: Sequence,
    tweet_seq: Sequence,
}

/// Monotonic row id source for one table.
#[derive(Default)]
struct Sequence(AtomicI64);

impl Sequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Keep later ids above an explicitly stored one.
    fn observe(&self, id: i64) {
        self.0.fetch_max(id, Ordering::SeqCst);
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            criteria: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
            quotes: RwLock::new(Vec::new()),
            tweets: RwLock::new(Vec::new()),
            criteria_seq: Sequence::default(),
            execution_seq: Sequence::default(),
            quote_seq: Sequence::default(),
            tweet_seq: Sequence::default(),
        }
    }

    /// Store `criteria` under its own id, replacing any row with that id.
    pub fn put_criteria(&self, criteria: Criteria) {
        let mut stored = self.criteria.write().unwrap();
        stored.retain(|c| c.id != criteria.id);
        self.criteria_seq.observe(criteria.id);
        stored.push(criteria);
    }

    /// Store `execution` as-is, bypassing the one-active-execution rule.
    ///
    /// Lets tests reproduce states a racing writer could leave behind.
    pub fn put_execution(&self, execution: Execution) {
        let mut stored = self.executions.write().unwrap();
        stored.retain(|e| e.id != execution.id);
        self.execution_seq.observe(execution.id);
        stored.push(execution);
    }

    /// Snapshot of stored tweets, in insertion order.
    pub fn tweets(&self) -> Vec<Tweet> {
        self.tweets.read().unwrap().clone()
    }

    /// Snapshot of stored quotes, in insertion order.
    pub fn quotes(&self) -> Vec<Quote> {
        self.quotes.read().unwrap().clone()
    }

    /// Snapshot of stored executions, in insertion order.
    pub fn executions(&self) -> Vec<Execution> {
        self.executions.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl CriteriaStore for InMemoryStore {
    async fn get_criteria(&self, id: i64) -> Result<Criteria> {
        self.criteria
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(Error::CriteriaRetrievalFailed)
    }

    async fn insert_criteria(&self, criteria: &NewCriteria) -> Result<i64> {
        criteria.validate()?;
        let mut stored = self.criteria.write().unwrap();
        let id = self.criteria_seq.next();
        stored.push(criteria.clone().with_id(id));
        Ok(id)
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn executions_by_statuses(&self, statuses: &[ExecutionStatus]) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .read()
            .unwrap()
            .iter()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, criteria_id: i64) -> Result<i64> {
        if !self.criteria.read().unwrap().iter().any(|c| c.id == criteria_id) {
            return Err(Error::ExecutionInsertionFailed);
        }

        let mut executions = self.executions.write().unwrap();
        if executions
            .iter()
            .any(|e| e.search_criteria_id == criteria_id && e.status.is_active())
        {
            return Err(Error::AlreadyEnqueued);
        }

        let id = self.execution_seq.next();
        let now = now_ts();
        executions.push(Execution {
            id,
            search_criteria_id: criteria_id,
            status: ExecutionStatus::Pending,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn update_execution_status(&self, id: i64, status: ExecutionStatus) -> Result<()> {
        let mut executions = self.executions.write().unwrap();
        let criteria_id = executions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.search_criteria_id)
            .ok_or(Error::ExecutionNotFound)?;

        if status.is_active()
            && executions
                .iter()
                .any(|e| e.id != id && e.search_criteria_id == criteria_id && e.status.is_active())
        {
            return Err(Error::AlreadyEnqueued);
        }

        if let Some(execution) = executions.iter_mut().find(|e| e.id == id) {
            execution.status = status;
            execution.updated_at = now_ts();
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteStore for InMemoryStore {
    async fn upsert_quote(&self, quote: &QuotePayload) -> Result<i64> {
        let hash = quote.fingerprint();
        let mut quotes = self.quotes.write().unwrap();
        if let Some(existing) = quotes.iter().find(|q| q.hash == hash) {
            return Ok(existing.id);
        }

        let id = self.quote_seq.next();
        quotes.push(Quote {
            id,
            hash,
            is_a_reply: quote.is_a_reply,
            text_content: quote.text_content.clone(),
            images: quote.images.clone(),
        });
        Ok(id)
    }

    async fn delete_orphan_quotes(&self, ids: &BTreeSet<i64>) -> Result<u64> {
        let tweets = self.tweets.read().unwrap();
        let mut quotes = self.quotes.write().unwrap();
        let before = quotes.len();
        quotes.retain(|q| !ids.contains(&q.id) || tweets.iter().any(|t| t.quote_id == Some(q.id)));
        Ok((before - quotes.len()) as u64)
    }
}

#[async_trait]
impl TweetStore for InMemoryStore {
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> Result<u64> {
        let mut stored = self.tweets.write().unwrap();
        let mut inserted = 0u64;
        for tweet in tweets {
            let conflict = stored
                .iter()
                .any(|t| t.hash == tweet.hash && t.search_criteria_id == tweet.search_criteria_id);
            if conflict {
                continue;
            }
            let id = self.tweet_seq.next();
            stored.push(Tweet {
                id,
                hash: tweet.hash.clone(),
                is_a_reply: tweet.is_a_reply,
                text_content: tweet.text_content.clone(),
                images: tweet.images.clone(),
                quote_id: tweet.quote_id,
                search_criteria_id: tweet.search_criteria_id,
            });
            inserted += 1;
        }
        Ok(inserted)
    }
}
