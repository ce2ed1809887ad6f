//! SQLite-backed implementation of the core storage traits.
//!
//! Queries run through inherent methods returning `anyhow::Result`; the
//! trait impls log the cause and translate it into the matching sentinel,
//! so `sqlx` errors never leave this module.

use std::collections::BTreeSet;
use std::fmt::Display;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use tweet_harness_core::models::{
    Criteria, Execution, ExecutionStatus, NewCriteria, NewTweet, QuotePayload,
};
use tweet_harness_core::store::{CriteriaStore, ExecutionStore, QuoteStore, TweetStore};
use tweet_harness_core::Error;

/// Six binds per tweet row; keeps each statement well under SQLite's
/// 32766 host-parameter limit.
const TWEET_ROWS_PER_STATEMENT: usize = 5000;

/// Quote ids per reaper statement.
const QUOTE_IDS_PER_STATEMENT: usize = 30000;

/// SQLite implementation of every storage trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn select_criteria(&self, id: i64) -> Result<Criteria> {
        let row = sqlx::query(
            r#"
            SELECT id, name, all_of_these_words, this_exact_phrase, any_of_these_words,
                   none_of_these_words, these_hashtags, language, since_date, until_date
            FROM search_criteria
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .with_context(|| format!("criteria not found: {}", id))?;

        Ok(Criteria {
            id: row.get("id"),
            name: row.get("name"),
            all_of_these_words: json_list(&row, "all_of_these_words")?,
            this_exact_phrase: row.get("this_exact_phrase"),
            any_of_these_words: json_list(&row, "any_of_these_words")?,
            none_of_these_words: json_list(&row, "none_of_these_words")?,
            these_hashtags: json_list(&row, "these_hashtags")?,
            language: row.get("language"),
            since: date(&row, "since_date")?,
            until: date(&row, "until_date")?,
        })
    }

    async fn insert_criteria_row(&self, c: &NewCriteria) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO search_criteria (name, all_of_these_words, this_exact_phrase,
                                         any_of_these_words, none_of_these_words,
                                         these_hashtags, language, since_date, until_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&c.name)
        .bind(serde_json::to_string(&c.all_of_these_words)?)
        .bind(&c.this_exact_phrase)
        .bind(serde_json::to_string(&c.any_of_these_words)?)
        .bind(serde_json::to_string(&c.none_of_these_words)?)
        .bind(serde_json::to_string(&c.these_hashtags)?)
        .bind(&c.language)
        .bind(c.since.format(DATE_FORMAT).to_string())
        .bind(c.until.format(DATE_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn select_executions(&self, statuses: &[ExecutionStatus]) -> Result<Vec<Execution>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, search_criteria_id, status, created_at, updated_at \
             FROM search_criteria_executions WHERE status IN (",
        );
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<Execution> {
                let status: String = row.get("status");
                Ok(Execution {
                    id: row.get("id"),
                    search_criteria_id: row.get("search_criteria_id"),
                    status: status.parse()?,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    async fn upsert_quote_row(&self, quote: &QuotePayload) -> Result<i64> {
        // The no-op DO UPDATE makes RETURNING yield the existing id on conflict.
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quotes (hash, is_a_reply, text_content, images)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET hash = excluded.hash
            RETURNING id
            "#,
        )
        .bind(quote.fingerprint())
        .bind(quote.is_a_reply)
        .bind(&quote.text_content)
        .bind(serde_json::to_string(&quote.images)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn delete_orphans(&self, ids: &BTreeSet<i64>) -> Result<u64> {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;

        for chunk in ids.chunks(QUOTE_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM quotes WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(
                ") AND NOT EXISTS (SELECT 1 FROM tweets WHERE tweets.quote_id = quotes.id)",
            );
            removed += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn insert_tweet_rows(&self, tweets: &[NewTweet]) -> Result<u64> {
        let images = tweets
            .iter()
            .map(|t| serde_json::to_string(&t.images))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Split statements share one transaction so the batch stays atomic.
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        let rows: Vec<(&NewTweet, &String)> = tweets.iter().zip(images.iter()).collect();
        for chunk in rows.chunks(TWEET_ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "INSERT INTO tweets (hash, is_a_reply, text_content, images, quote_id, search_criteria_id) ",
            );
            builder.push_values(chunk.iter().copied(), |mut b, (tweet, images)| {
                b.push_bind(&tweet.hash)
                    .push_bind(tweet.is_a_reply)
                    .push_bind(&tweet.text_content)
                    .push_bind(images)
                    .push_bind(tweet.quote_id)
                    .push_bind(tweet.search_criteria_id);
            });
            builder.push(" ON CONFLICT(hash, search_criteria_id) DO NOTHING");
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn json_list(row: &SqliteRow, column: &str) -> Result<Vec<String>> {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).with_context(|| format!("column {} is not a JSON array", column))
}

fn date(row: &SqliteRow, column: &str) -> Result<NaiveDate> {
    let raw: String = row.get(column);
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .with_context(|| format!("column {} is not a YYYY-MM-DD date: {}", column, raw))
}

/// Log `e` and replace it with `sentinel`.
fn fail<E: Display>(sentinel: Error, operation: &'static str) -> impl FnOnce(E) -> Error {
    move |e| {
        tracing::error!(error = %e, operation, "storage operation failed");
        sentinel
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl CriteriaStore for SqliteStore {
    async fn get_criteria(&self, id: i64) -> tweet_harness_core::Result<Criteria> {
        self.select_criteria(id)
            .await
            .map_err(fail(Error::CriteriaRetrievalFailed, "select criteria by id"))
    }

    async fn insert_criteria(&self, criteria: &NewCriteria) -> tweet_harness_core::Result<i64> {
        criteria.validate()?;
        self.insert_criteria_row(criteria)
            .await
            .map_err(fail(Error::CriteriaInsertionFailed, "insert criteria"))
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn executions_by_statuses(
        &self,
        statuses: &[ExecutionStatus],
    ) -> tweet_harness_core::Result<Vec<Execution>> {
        self.select_executions(statuses)
            .await
            .map_err(fail(Error::ExecutionsRetrievalFailed, "select executions by statuses"))
    }

    async fn insert_execution(&self, criteria_id: i64) -> tweet_harness_core::Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO search_criteria_executions (search_criteria_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(criteria_id)
        .bind(ExecutionStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(criteria_id, "criteria already has an active execution");
                Err(Error::AlreadyEnqueued)
            }
            Err(e) => Err(fail(Error::ExecutionInsertionFailed, "insert execution")(e)),
        }
    }

    async fn update_execution_status(
        &self,
        id: i64,
        status: ExecutionStatus,
    ) -> tweet_harness_core::Result<()> {
        let result = sqlx::query(
            "UPDATE search_criteria_executions SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(Error::ExecutionNotFound),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyEnqueued),
            Err(e) => Err(fail(Error::ExecutionUpdateFailed, "update execution status")(e)),
        }
    }
}

#[async_trait]
impl QuoteStore for SqliteStore {
    async fn upsert_quote(&self, quote: &QuotePayload) -> tweet_harness_core::Result<i64> {
        self.upsert_quote_row(quote)
            .await
            .map_err(fail(Error::QuoteInsertionFailed, "upsert quote"))
    }

    async fn delete_orphan_quotes(&self, ids: &BTreeSet<i64>) -> tweet_harness_core::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_orphans(ids)
            .await
            .map_err(fail(Error::OrphanCleanupFailed, "delete orphan quotes"))
    }
}

#[async_trait]
impl TweetStore for SqliteStore {
    async fn insert_tweets(&self, tweets: &[NewTweet]) -> tweet_harness_core::Result<u64> {
        if tweets.is_empty() {
            return Ok(0);
        }
        self.insert_tweet_rows(tweets)
            .await
            .map_err(fail(Error::TweetsInsertionFailed, "insert tweets"))
    }
}
