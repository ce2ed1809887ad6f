//! CLI command bodies.
//!
//! Each `run_*` function opens its own pool, wires the core components
//! to [`SqliteStore`], prints a short report to stdout, and closes the
//! pool before returning.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use tweet_harness_core::enqueue::EnqueueGuard;
use tweet_harness_core::ingest::TweetIngester;
use tweet_harness_core::models::{NewCriteria, TweetCandidate};
use tweet_harness_core::store::CriteriaStore;

use crate::config::Config;
use crate::db;
use crate::scraper::HttpScraperGateway;
use crate::sqlite_store::SqliteStore;

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn enqueue_guard(config: &Config, store: &Arc<SqliteStore>) -> Result<EnqueueGuard> {
    let gateway = Arc::new(HttpScraperGateway::new(&config.scraper)?);
    Ok(EnqueueGuard::new(store.clone(), store.clone(), gateway))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `twh enqueue <id> [--forced]`
pub async fn run_enqueue(config: &Config, criteria_id: i64, forced: bool) -> Result<()> {
    let store = open_store(config).await?;
    let guard = enqueue_guard(config, &store)?;

    let outcome = guard.enqueue(criteria_id, forced).await;
    store.pool().close().await;
    outcome?;

    println!("criteria {} enqueued", criteria_id);
    Ok(())
}

/// `twh resume`
pub async fn run_resume(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let guard = enqueue_guard(config, &store)?;

    let outcome = guard.resume().await;
    store.pool().close().await;
    let dispatched = outcome?;

    println!("resume");
    println!("  criteria re-dispatched: {}", dispatched);
    println!("ok");
    Ok(())
}

/// `twh ingest <file.json>`: a JSON array of tweets, same shape as
/// `POST /tweets/v1`.
pub async fn run_ingest_file(config: &Config, path: &Path) -> Result<()> {
    let candidates: Vec<TweetCandidate> = read_json(path)?;

    let store = open_store(config).await?;
    let ingester = TweetIngester::new(store.clone(), store.clone());
    let outcome = ingester.ingest(&candidates).await;
    store.pool().close().await;
    let summary = outcome?;

    println!("ingest {}", path.display());
    println!("  received: {}", summary.received);
    println!("  inserted: {}", summary.inserted);
    println!("  quotes touched: {}", summary.quotes_touched);
    if summary.quotes_failed > 0 {
        println!("  quotes failed: {}", summary.quotes_failed);
    }
    println!("  orphan quotes removed: {}", summary.orphans_removed);
    if summary.orphan_cleanup_failed {
        println!("  warning: orphan quote cleanup failed");
    }
    println!("ok");
    Ok(())
}

/// `twh criteria add <file.json>`
pub async fn run_add_criteria(config: &Config, path: &Path) -> Result<()> {
    let criteria: NewCriteria = read_json(path)?;

    let store = open_store(config).await?;
    let outcome = store.insert_criteria(&criteria).await;
    store.pool().close().await;
    let id = outcome?;

    println!("criteria {} created ({})", id, criteria.name);
    Ok(())
}
