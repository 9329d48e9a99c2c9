//! SQLite-backed message store

use async_trait::async_trait;
use chrono::DateTime;
use eventgrep_core::{Criteria, Error, Message, MessageStore, Result, SearchQuery, StorePage};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::query::{MESSAGE_COLUMNS, push_criteria, push_page};
use crate::schema::{SCHEMA_VERSION, initialize_schema, schema_version};

/// Message log stored in a single SQLite database.
///
/// Users and packages live in side tables keyed by the message row id so
/// that include/exclude filters become `EXISTS` subqueries.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (or create) the database at `path`.
    ///
    /// A leading `~` is expanded to the home directory and missing parent
    /// directories are created.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = expand_tilde(path.into())?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!(
                    "Failed to open database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        initialize_schema(&pool).await?;

        let version = schema_version(&pool).await?;
        if version != SCHEMA_VERSION {
            return Err(Error::StorageUnavailable(format!(
                "Unsupported schema version: {}",
                version
            )));
        }

        info!(path = %path.display(), "Opened SQLite message store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append one message.
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if a message with the same id is already stored
    pub async fn append(&self, message: &Message) -> Result<()> {
        self.append_batch(std::slice::from_ref(message)).await?;
        Ok(())
    }

    /// Append messages in one transaction. Either all are stored or none.
    pub async fn append_batch(&self, messages: &[Message]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for message in messages {
            insert_message(&mut tx, message).await?;
        }

        tx.commit().await.map_err(storage)?;
        debug!(count = messages.len(), "Appended messages");
        Ok(messages.len())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn search(&self, query: &SearchQuery) -> Result<StorePage> {
        // Both statements run inside one read transaction so total and page
        // come from the same WAL snapshot
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages m");
        push_criteria(&mut count_qb, &query.criteria);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;

        let mut page_qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM messages m", MESSAGE_COLUMNS));
        push_criteria(&mut page_qb, &query.criteria);
        push_page(&mut page_qb, query);
        let rows = page_qb.build().fetch_all(&mut *tx).await.map_err(storage)?;

        let items = hydrate(&mut tx, rows).await?;
        tx.commit().await.map_err(storage)?;

        let total = u64::try_from(total).unwrap_or(0);
        debug!(total, returned = items.len(), "SQLite search complete");
        Ok(StorePage {
            total,
            pages: total.div_ceil(u64::from(query.rows_per_page.max(1))),
            items,
        })
    }

    async fn count(&self, criteria: &Criteria) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages m");
        push_criteria(&mut qb, criteria);
        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn count_all(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn get_message(&self, msg_id: &str) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM messages m WHERE m.msg_id = ?",
            MESSAGE_COLUMNS
        ))
        .bind(msg_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => Ok(hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

async fn insert_message(conn: &mut SqliteConnection, message: &Message) -> Result<()> {
    if message.timestamp.timestamp_subsec_nanos() % 1_000 != 0 {
        return Err(Error::invalid(format!(
            "message {} has a timestamp finer than one microsecond",
            message.msg_id
        )));
    }

    let body = if message.body.is_null() {
        None
    } else {
        Some(serde_json::to_string(&message.body)?)
    };

    let result = sqlx::query(
        r#"
        INSERT INTO messages (msg_id, timestamp_us, topic, category, summary, body, body_text)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&message.msg_id)
    .bind(message.timestamp.timestamp_micros())
    .bind(&message.topic)
    .bind(&message.category)
    .bind(&message.summary)
    .bind(body)
    .bind(message.body_text().map(|text| text.into_owned()))
    .execute(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            Error::invalid(format!("duplicate message id {}", message.msg_id))
        }
        other => storage(other),
    })?;

    let row_id = result.last_insert_rowid();

    for user in &message.users {
        sqlx::query("INSERT OR IGNORE INTO message_users (message_id, username) VALUES (?, ?)")
            .bind(row_id)
            .bind(user)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
    }
    for package in &message.packages {
        sqlx::query("INSERT OR IGNORE INTO message_packages (message_id, package) VALUES (?, ?)")
            .bind(row_id)
            .bind(package)
            .execute(&mut *conn)
            .await
            .map_err(storage)?;
    }

    Ok(())
}

/// Turn message rows into `Message`s, loading users and packages for all of
/// them with one query per side table. Row order is preserved.
async fn hydrate(conn: &mut SqliteConnection, rows: Vec<SqliteRow>) -> Result<Vec<Message>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|row| row.get::<i64, _>("id")).collect();
    let mut users = load_related(conn, "message_users", "username", &ids).await?;
    let mut packages = load_related(conn, "message_packages", "package", &ids).await?;

    rows.into_iter()
        .map(|row| {
            let id: i64 = row.get("id");
            let micros: i64 = row.get("timestamp_us");
            let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                Error::StorageUnavailable(format!("stored timestamp out of range: {}", micros))
            })?;
            let body = match row.get::<Option<String>, _>("body") {
                Some(text) => serde_json::from_str(&text)?,
                None => serde_json::Value::Null,
            };

            Ok(Message {
                msg_id: row.get("msg_id"),
                timestamp,
                topic: row.get("topic"),
                category: row.get("category"),
                users: users.remove(&id).unwrap_or_default(),
                packages: packages.remove(&id).unwrap_or_default(),
                summary: row.get("summary"),
                body,
            })
        })
        .collect()
}

async fn load_related(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT r.message_id, r.{column} FROM {table} r WHERE r.message_id IN ("
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY r.rowid");

    let rows = qb.build().fetch_all(&mut *conn).await.map_err(storage)?;

    let mut related: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        related
            .entry(row.get::<i64, _>(0))
            .or_default()
            .push(row.get::<String, _>(1));
    }
    Ok(related)
}

fn storage(e: sqlx::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

fn expand_tilde(path: PathBuf) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path),
    }
}

/// Database path used when none is configured.
pub fn default_database_path() -> PathBuf {
    Path::new("~").join(".eventgrep").join("messages.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use eventgrep_core::{Dimension, Order, QueryConfig, TimeWindow};
    use tempfile::TempDir;

    const BASE: i64 = 1_564_503_781;

    fn message(i: i64) -> Message {
        Message {
            msg_id: format!("msg-{i:03}"),
            timestamp: Utc.timestamp_opt(BASE + i * 10, 0).unwrap(),
            topic: format!("org.example.prod.{}.update", if i % 2 == 0 { "git" } else { "wiki" }),
            category: if i % 2 == 0 { "git" } else { "wiki" }.to_string(),
            users: vec![format!("user{}", i % 3), "shared".to_string()],
            packages: if i % 5 == 0 { vec!["kernel".to_string()] } else { vec![] },
            summary: Some(format!("change {i}")),
            body: if i == 4 {
                serde_json::json!({"text": "100% Done"})
            } else {
                serde_json::Value::Null
            },
        }
    }

    async fn store(temp_dir: &TempDir) -> SqliteMessageStore {
        let store = SqliteMessageStore::new(temp_dir.path().join("nested").join("test.db"))
            .await
            .unwrap();
        let messages: Vec<Message> = (0..20).map(message).collect();
        assert_eq!(store.append_batch(&messages).await.unwrap(), 20);
        store
    }

    fn query(builder: eventgrep_core::search::SearchQueryBuilder) -> SearchQuery {
        builder
            .build(
                Utc.timestamp_opt(BASE + 3600, 0).unwrap(),
                &QueryConfig::default(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_store_and_schema_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMessageStore::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        assert_eq!(schema_version(store.pool()).await.unwrap(), SCHEMA_VERSION);

        // Reopening an existing database keeps the schema
        drop(store);
        assert!(
            SqliteMessageStore::new(temp_dir.path().join("test.db"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_get_message_round_trips_fields() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let msg = store.get_message("msg-004").await.unwrap().unwrap();
        assert_eq!(msg, message(4));
        assert!(store.get_message("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_and_batch_rolled_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let err = store
            .append_batch(&[message(100), message(1)])
            .await
            .unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(store.get_message("msg-100").await.unwrap().is_none());
        assert_eq!(store.count_all().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_search_pages_newest_first_with_tie_break() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let mut twin = message(19);
        twin.msg_id = "msg-019a".to_string();
        store.append(&twin).await.unwrap();

        let page = store
            .search(&query(SearchQuery::builder().rows_per_page(3)))
            .await
            .unwrap();
        assert_eq!(page.total, 21);
        assert_eq!(page.pages, 7);
        let ids: Vec<_> = page.items.iter().map(|m| m.msg_id.as_str()).collect();
        assert_eq!(ids, ["msg-019", "msg-019a", "msg-018"]);

        let page = store
            .search(&query(
                SearchQuery::builder()
                    .order(Order::Asc)
                    .rows_per_page(5)
                    .page(5),
            ))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].msg_id, "msg-019a");
    }

    #[tokio::test]
    async fn test_filters_and_window() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let page = store
            .search(&query(
                SearchQuery::builder()
                    .include(Dimension::Category, "git")
                    .exclude(Dimension::User, "user0")
                    .rows_per_page(100),
            ))
            .await
            .unwrap();
        assert!(page.items.iter().all(|m| m.category == "git"));
        assert!(page.items.iter().all(|m| !m.users.contains(&"user0".to_string())));
        // Even i in 0..20 (10 messages) minus i % 3 == 0 among them (0, 6, 12, 18)
        assert_eq!(page.total, 6);

        let page = store
            .search(&query(
                SearchQuery::builder()
                    .include(Dimension::Package, "kernel")
                    .window(TimeWindow::between(
                        Utc.timestamp_opt(BASE, 0).unwrap(),
                        Utc.timestamp_opt(BASE + 100, 0).unwrap(),
                    )),
            ))
            .await
            .unwrap();
        // kernel on 0, 5; 10 sits exactly on the exclusive end
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive_and_literal() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let window = TimeWindow::between(
            Utc.timestamp_opt(BASE, 0).unwrap(),
            Utc.timestamp_opt(BASE + 3600, 0).unwrap(),
        );

        let page = store
            .search(&query(
                SearchQuery::builder()
                    .window(window)
                    .contains("100% done"),
            ))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].msg_id, "msg-004");

        // `%` must not act as a wildcard
        let count = store
            .count(&Criteria {
                window,
                contains: ["change%1".to_string()].into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_contains_searches_raw_string_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let mut quoted = message(7);
        quoted.msg_id = "quoted".to_string();
        quoted.summary = None;
        quoted.body = serde_json::Value::String("he said \"hi\" on C:\\tmp".to_string());
        store.append(&quoted).await.unwrap();

        let window = TimeWindow::between(
            Utc.timestamp_opt(BASE, 0).unwrap(),
            Utc.timestamp_opt(BASE + 3600, 0).unwrap(),
        );
        for term in ["\"hi\"", "c:\\tmp", "SAID"] {
            let count = store
                .count(&Criteria {
                    window,
                    contains: [term.to_string()].into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(count, 1, "term {term}");
        }

        assert_eq!(store.get_message("quoted").await.unwrap().unwrap(), quoted);
    }

    #[tokio::test]
    async fn test_sub_microsecond_timestamps() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let mut fine = message(50);
        fine.timestamp = fine.timestamp + chrono::TimeDelta::nanoseconds(1);
        assert!(store.append(&fine).await.unwrap_err().is_invalid_parameter());

        // A start a nanosecond after a stored message excludes it
        let at_zero = Utc.timestamp_opt(BASE, 0).unwrap();
        let count = store
            .count(&Criteria {
                window: TimeWindow::between(
                    at_zero + chrono::TimeDelta::nanoseconds(1),
                    at_zero + chrono::TimeDelta::seconds(10),
                ),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_older_schema_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        let store = SqliteMessageStore::new(&path).await.unwrap();
        sqlx::query("UPDATE schema_version SET version = 1")
            .execute(store.pool())
            .await
            .unwrap();
        store.pool().close().await;

        let err = SqliteMessageStore::new(&path).await.err().unwrap();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_count_matches_search_total() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let q = query(SearchQuery::builder().include(Dimension::User, "user1"));

        let page = store.search(&q).await.unwrap();
        assert_eq!(store.count(&q.criteria).await.unwrap(), page.total);
        assert_eq!(store.count_all().await.unwrap(), 20);
    }

    #[test]
    fn test_expand_tilde() {
        let plain = PathBuf::from("/tmp/messages.db");
        assert_eq!(expand_tilde(plain.clone()).unwrap(), plain);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde(default_database_path()).unwrap(),
                home.join(".eventgrep").join("messages.db")
            );
        }
    }
}
