//! SQLite schema for the message log

use eventgrep_core::{Error, Result};
use sqlx::sqlite::SqlitePool;

pub(crate) const SCHEMA_VERSION: i32 = 2;

pub(crate) async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    exec(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .await?;

    // Only a fresh database is stamped; an older one keeps its version and is
    // rejected by the version check
    sqlx::query(
        "INSERT INTO schema_version (version) \
         SELECT ? WHERE NOT EXISTS (SELECT 1 FROM schema_version)",
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await
    .map_err(|e| Error::StorageUnavailable(format!("Failed to initialize schema: {}", e)))?;

    // Timestamps are stored as Unix microseconds so range predicates and
    // ordering compare integers. `body` is the JSON payload; `body_text` is
    // the text substring search runs against (raw for string bodies)
    exec(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            msg_id TEXT NOT NULL UNIQUE,
            timestamp_us INTEGER NOT NULL,
            topic TEXT NOT NULL,
            category TEXT NOT NULL,
            summary TEXT,
            body TEXT,
            body_text TEXT
        )
        "#,
    )
    .await?;

    exec(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_messages_time ON messages(timestamp_us, msg_id)",
    )
    .await?;
    exec(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_messages_category ON messages(category, timestamp_us)",
    )
    .await?;
    exec(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages(topic, timestamp_us)",
    )
    .await?;

    exec(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS message_users (
            message_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            PRIMARY KEY (message_id, username),
            FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
        )
        "#,
    )
    .await?;
    exec(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_message_users_name ON message_users(username, message_id)",
    )
    .await?;

    exec(
        pool,
        r#"
        CREATE TABLE IF NOT EXISTS message_packages (
            message_id INTEGER NOT NULL,
            package TEXT NOT NULL,
            PRIMARY KEY (message_id, package),
            FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
        )
        "#,
    )
    .await?;
    exec(
        pool,
        "CREATE INDEX IF NOT EXISTS idx_message_packages_name ON message_packages(package, message_id)",
    )
    .await?;

    Ok(())
}

pub(crate) async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("Failed to read schema version: {}", e)))
}

async fn exec(pool: &SqlitePool, sql: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(pool)
        .await
        .map_err(|e| Error::StorageUnavailable(format!("Failed to initialize schema: {}", e)))?;
    Ok(())
}
