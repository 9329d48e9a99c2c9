//! Message store trait
//!
//! The `MessageStore` trait is the storage collaborator the planner runs
//! against. Implementations:
//! - `InMemoryStore`: process-local vector, used for tests and demos
//! - `SqliteMessageStore` (eventgrep-store-sqlite): SQLite-backed store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::search::{Criteria, SearchQuery};
use crate::types::Message;
use crate::Result;

/// One page of matches as returned by a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorePage {
    /// Matches across all pages
    pub total: u64,
    pub pages: u64,
    pub items: Vec<Message>,
}

impl StorePage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Storage collaborator
///
/// The store is append-only and written concurrently by other processes.
///
/// # Example
/// ```no_run
/// # use eventgrep_core::{MessageStore, QueryConfig, RawParams, resolve};
/// # async fn example(store: &dyn MessageStore) -> eventgrep_core::Result<()> {
/// let query = resolve(&RawParams::new().delta("600"), chrono::Utc::now(), &QueryConfig::default())?;
/// let page = store.search(&query).await?;
/// println!("{} of {}", page.items.len(), page.total);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Run a filtered, ordered, paginated retrieval.
    ///
    /// `total` and `items` must come from one consistent view of the store so
    /// that a concurrent append cannot skew the total against the page.
    /// Items are ordered by timestamp in `query.order`, ties broken by
    /// `msg_id` ascending. The window is half-open `[start, end)`.
    ///
    /// # Errors
    /// - `Error::StorageUnavailable` when the backend cannot be reached or fails
    async fn search(&self, query: &SearchQuery) -> Result<StorePage>;

    /// Count messages matching the criteria.
    ///
    /// # Errors
    /// - `Error::StorageUnavailable` when the backend cannot be reached or fails
    async fn count(&self, criteria: &Criteria) -> Result<u64>;

    /// Count every stored message, unfiltered.
    async fn count_all(&self) -> Result<u64> {
        self.count(&Criteria::default()).await
    }

    /// Fetch one message by identifier.
    ///
    /// Returns `Ok(None)` when the identifier is unknown.
    async fn get_message(&self, msg_id: &str) -> Result<Option<Message>>;
}
