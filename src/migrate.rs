use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Term sets and hashtags are JSON arrays; since/until are YYYY-MM-DD.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_criteria (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            all_of_these_words TEXT NOT NULL DEFAULT '[]',
            this_exact_phrase TEXT NOT NULL DEFAULT '',
            any_of_these_words TEXT NOT NULL DEFAULT '[]',
            none_of_these_words TEXT NOT NULL DEFAULT '[]',
            these_hashtags TEXT NOT NULL DEFAULT '[]',
            language TEXT NOT NULL,
            since_date TEXT NOT NULL,
            until_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_criteria_executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            search_criteria_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'IN PROGRESS', 'DONE', 'FAILED')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (search_criteria_id) REFERENCES search_criteria(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active execution per criteria.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_executions_one_active
        ON search_criteria_executions(search_criteria_id)
        WHERE status IN ('PENDING', 'IN PROGRESS')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_status ON search_criteria_executions(status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quotes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash TEXT NOT NULL UNIQUE,
            is_a_reply INTEGER NOT NULL DEFAULT 0,
            text_content TEXT NOT NULL DEFAULT '',
            images TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tweets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash TEXT NOT NULL,
            is_a_reply INTEGER NOT NULL DEFAULT 0,
            text_content TEXT NOT NULL DEFAULT '',
            images TEXT NOT NULL DEFAULT '[]',
            quote_id INTEGER,
            search_criteria_id INTEGER NOT NULL,
            UNIQUE(hash, search_criteria_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The orphan reaper probes tweets by quote_id.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tweets_quote_id ON tweets(quote_id)")
        .execute(pool)
        .await?;

    Ok(())
}
