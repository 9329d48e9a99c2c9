//! Query planning and execution against a message store

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::aggregate::{self, ChartRequest, ChartResult};
use crate::config::QueryConfig;
use crate::paginate::PageResult;
use crate::params::RawParams;
use crate::search::{self, SearchQuery};
use crate::store::MessageStore;
use crate::types::Message;
use crate::{Error, Result};

/// Binds a store to a configuration and runs resolved queries against it.
///
/// Holds no per-request state; one engine can serve any number of concurrent
/// requests.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn MessageStore>,
    config: QueryConfig,
}

impl QueryEngine {
    /// # Errors
    /// - `Error::Config` if the configuration does not validate
    pub fn new(store: Arc<dyn MessageStore>, config: QueryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn resolve(&self, raw: &RawParams, now: DateTime<Utc>) -> Result<SearchQuery> {
        search::resolve(raw, now, &self.config)
    }

    /// Run one search and shape the result into a page envelope.
    ///
    /// Count and page come from the store's single `search` call, never from
    /// a separate `count`.
    pub async fn execute(&self, query: &SearchQuery) -> Result<PageResult<Message>> {
        debug!(
            page = query.page,
            rows_per_page = query.rows_per_page,
            order = %query.order,
            bounded = query.window().is_bounded(),
            "Executing message search"
        );

        let page = self.bounded(self.store.search(query)).await?;
        let result = PageResult::from_store(page, query.rows_per_page);

        debug!(
            total = result.total,
            count = result.count,
            "Message search complete"
        );
        Ok(result)
    }

    /// Resolve raw parameters and execute them in one step.
    pub async fn search(
        &self,
        raw: &RawParams,
        now: DateTime<Utc>,
    ) -> Result<PageResult<Message>> {
        let query = self.resolve(raw, now)?;
        self.execute(&query).await
    }

    /// Bucket the matches of `query` into time intervals.
    pub async fn aggregate(
        &self,
        query: &SearchQuery,
        request: &ChartRequest,
    ) -> Result<ChartResult> {
        let plan = aggregate::plan(&query.criteria, request, &self.config)?;
        debug!(
            series = plan.series.len(),
            buckets = plan.buckets.len(),
            "Aggregating message counts"
        );
        aggregate::run(plan, |criteria| async move {
            self.bounded(self.store.count(&criteria)).await
        })
        .await
    }

    /// # Errors
    /// - `Error::NotFound` if no message has this identifier
    pub async fn get_message(&self, msg_id: &str) -> Result<Message> {
        let msg_id = msg_id.trim();
        if msg_id.is_empty() {
            return Err(Error::invalid("id must not be empty"));
        }
        self.bounded(self.store.get_message(msg_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", msg_id)))
    }

    /// Total number of stored messages, unfiltered.
    pub async fn message_count(&self) -> Result<u64> {
        self.bounded(self.store.count_all()).await
    }

    /// Apply the configured storage timeout to one store call.
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.storage_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| {
                    Error::StorageUnavailable(format!("storage call timed out after {}s", secs))
                })?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Criteria;
    use crate::store::StorePage;
    use crate::types::Order;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl MessageStore for Store {
            async fn search(&self, query: &SearchQuery) -> Result<StorePage>;
            async fn count(&self, criteria: &Criteria) -> Result<u64>;
            async fn count_all(&self) -> Result<u64>;
            async fn get_message(&self, msg_id: &str) -> Result<Option<Message>>;
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn engine(store: MockStore, config: QueryConfig) -> QueryEngine {
        QueryEngine::new(Arc::new(store), config).unwrap()
    }

    #[tokio::test]
    async fn test_default_request_hands_defaults_to_store() {
        let mut store = MockStore::new();
        store
            .expect_search()
            .withf(|query| {
                query.page == 1
                    && query.rows_per_page == 25
                    && query.order == Order::Desc
                    && query.criteria == Criteria::default()
            })
            .times(1)
            .returning(|_| Ok(StorePage::empty()));
        store.expect_count().never();

        let engine = engine(store, QueryConfig::default());
        let result = engine.search(&RawParams::default(), now()).await.unwrap();

        assert_eq!(result.count, 0);
        assert_eq!(result.total, 0);
        assert_eq!(result.pages, 0);
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_default_delta_reaches_store() {
        let mut store = MockStore::new();
        store
            .expect_search()
            .withf(|query| query.window().span() == Some(TimeDelta::seconds(180)))
            .times(1)
            .returning(|_| Ok(StorePage::empty()));

        let config = QueryConfig {
            default_query_delta: Some(180),
            ..Default::default()
        };
        engine(store, config)
            .search(&RawParams::default(), now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_parameters_never_reach_store() {
        let mut store = MockStore::new();
        store.expect_search().never();

        let engine = engine(store, QueryConfig::default());
        let err = engine
            .search(&RawParams::new().category("wat").contains("foo"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnboundedSearch(_)));

        let err = engine
            .search(&RawParams::new().page("0"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates_without_retry() {
        let mut store = MockStore::new();
        store
            .expect_search()
            .times(1)
            .returning(|_| Err(Error::StorageUnavailable("database is locked".to_string())));

        let err = engine(store, QueryConfig::default())
            .search(&RawParams::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_pages_recomputed_from_total() {
        let mut store = MockStore::new();
        store.expect_search().returning(|_| {
            Ok(StorePage {
                total: 51,
                pages: 99,
                items: vec![],
            })
        });

        let result = engine(store, QueryConfig::default())
            .search(&RawParams::default(), now())
            .await
            .unwrap();
        assert_eq!(result.pages, 3);
    }

    #[tokio::test]
    async fn test_get_message() {
        let mut store = MockStore::new();
        store
            .expect_get_message()
            .withf(|id| id.to_string() == "one")
            .returning(|_| Ok(None));

        let engine = engine(store, QueryConfig::default());
        let err = engine.get_message(" one ").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(engine.get_message("").await.unwrap_err().is_invalid_parameter());
    }

    #[tokio::test]
    async fn test_message_count() {
        let mut store = MockStore::new();
        store.expect_count_all().times(1).returning(|| Ok(42));

        let count = engine(store, QueryConfig::default())
            .message_count()
            .await
            .unwrap();
        assert_eq!(count, 42);
    }

    /// Answers every call after `delay`
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl MessageStore for SlowStore {
        async fn search(&self, _query: &SearchQuery) -> Result<StorePage> {
            tokio::time::sleep(self.delay).await;
            Ok(StorePage::empty())
        }

        async fn count(&self, _criteria: &Criteria) -> Result<u64> {
            tokio::time::sleep(self.delay).await;
            Ok(7)
        }

        async fn get_message(&self, _msg_id: &str) -> Result<Option<Message>> {
            tokio::time::sleep(self.delay).await;
            Ok(None)
        }
    }

    fn slow_engine(delay_secs: u64, timeout_secs: Option<u64>) -> QueryEngine {
        let config = QueryConfig {
            storage_timeout_secs: timeout_secs,
            ..Default::default()
        };
        QueryEngine::new(
            Arc::new(SlowStore {
                delay: Duration::from_secs(delay_secs),
            }),
            config,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_timeout_maps_to_unavailable() {
        let engine = slow_engine(60, Some(5));

        let err = engine
            .search(&RawParams::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.to_string().contains("timed out after 5s"));

        // count_all goes through the default count and is bounded too
        let err = engine.message_count().await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_call_within_timeout_succeeds() {
        let engine = slow_engine(2, Some(5));
        assert_eq!(engine.message_count().await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_waits_for_store() {
        let engine = slow_engine(3_600, None);
        let result = engine.search(&RawParams::default(), now()).await.unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(engine.message_count().await.unwrap(), 7);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QueryConfig {
            max_rows_per_page: 0,
            ..Default::default()
        };
        assert!(QueryEngine::new(Arc::new(MockStore::new()), config).is_err());
    }
}
