//! SQLite message storage for EventGrep
//!
//! Implements the `MessageStore` trait on a single SQLite database in WAL
//! mode. Search totals and pages are read inside one transaction, so the
//! envelope never mixes two snapshots of the log.
//!
//! # Example
//! ```no_run
//! # use eventgrep_store_sqlite::SqliteMessageStore;
//! # use eventgrep_core::{MessageStore, QueryConfig, QueryEngine, RawParams};
//! # use std::sync::Arc;
//! # async fn example() -> eventgrep_core::Result<()> {
//! let store = SqliteMessageStore::new("~/.eventgrep/messages.db").await?;
//! let engine = QueryEngine::new(Arc::new(store), QueryConfig::default())?;
//! let page = engine
//!     .search(&RawParams::new().category("git"), chrono::Utc::now())
//!     .await?;
//! println!("{} of {}", page.count, page.total);
//! # Ok(())
//! # }
//! ```

mod query;
mod schema;
mod sqlite_message_store;

pub use sqlite_message_store::{SqliteMessageStore, default_database_path};
