//! In-memory message store

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::paginate::page_count;
use crate::search::{Criteria, SearchQuery};
use crate::store::{MessageStore, StorePage};
use crate::types::{Message, Order};
use crate::{Error, Result};

/// Vector-backed store evaluating criteria directly against each message.
///
/// Count and page are computed under a single read lock, so `search` is
/// consistent under concurrent appends.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(messages)),
        }
    }

    /// Append a message. Identifiers must be unique.
    pub async fn append(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|m| m.msg_id == message.msg_id) {
            return Err(Error::invalid(format!(
                "message {} already exists",
                message.msg_id
            )));
        }
        messages.push(message);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

/// Timestamp order in the requested direction, then `msg_id` ascending.
pub fn compare_messages(a: &Message, b: &Message, order: Order) -> Ordering {
    let by_time = match order {
        Order::Asc => a.timestamp.cmp(&b.timestamp),
        Order::Desc => b.timestamp.cmp(&a.timestamp),
    };
    by_time.then_with(|| a.msg_id.cmp(&b.msg_id))
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn search(&self, query: &SearchQuery) -> Result<StorePage> {
        let messages = self.messages.read().await;

        let mut matches: Vec<&Message> = messages
            .iter()
            .filter(|m| query.criteria.matches(m))
            .collect();
        matches.sort_by(|a, b| compare_messages(a, b, query.order));

        let total = matches.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = matches
            .into_iter()
            .skip(offset)
            .take(query.rows_per_page as usize)
            .cloned()
            .collect();

        Ok(StorePage {
            total,
            pages: page_count(total, query.rows_per_page),
            items,
        })
    }

    async fn count(&self, criteria: &Criteria) -> Result<u64> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| criteria.matches(m)).count() as u64)
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.messages.read().await.len() as u64)
    }

    async fn get_message(&self, msg_id: &str) -> Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.msg_id == msg_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::types::Dimension;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn msg(id: &str, secs: i64, category: &str, user: &str) -> Message {
        Message {
            msg_id: id.to_string(),
            timestamp: at(secs),
            topic: format!("org.example.prod.{}.event", category),
            category: category.to_string(),
            users: vec![user.to_string()],
            packages: vec![],
            summary: Some(format!("{} did something in {}", user, category)),
            body: serde_json::Value::Null,
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::with_messages(vec![
            msg("c", 100, "git", "alice"),
            msg("a", 100, "git", "bob"),
            msg("b", 200, "bodhi", "alice"),
            msg("d", 300, "git", "mallory"),
        ])
    }

    fn query(builder: crate::search::SearchQueryBuilder) -> SearchQuery {
        builder.build(at(1000), &QueryConfig::default()).unwrap()
    }

    fn ids(page: &StorePage) -> Vec<&str> {
        page.items.iter().map(|m| m.msg_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_desc_order_with_id_tiebreak() {
        let page = store().search(&query(SearchQuery::builder())).await.unwrap();
        assert_eq!(ids(&page), vec!["d", "b", "a", "c"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 1);
    }

    #[tokio::test]
    async fn test_asc_order_with_id_tiebreak() {
        let page = store()
            .search(&query(SearchQuery::builder().order(Order::Asc)))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["a", "c", "b", "d"]);
    }

    #[tokio::test]
    async fn test_pagination_slices_in_order() {
        let store = store();
        let first = store
            .search(&query(SearchQuery::builder().rows_per_page(3)))
            .await
            .unwrap();
        let second = store
            .search(&query(SearchQuery::builder().rows_per_page(3).page(2)))
            .await
            .unwrap();

        assert_eq!(ids(&first), vec!["d", "b", "a"]);
        assert_eq!(ids(&second), vec!["c"]);
        assert_eq!(second.total, 4);
        assert_eq!(second.pages, 2);
    }

    #[tokio::test]
    async fn test_filters_and_window() {
        let store = store();
        let page = store
            .search(&query(
                SearchQuery::builder()
                    .include(Dimension::Category, "git")
                    .exclude(Dimension::User, "mallory"),
            ))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["a", "c"]);

        let page = store
            .search(&query(SearchQuery::builder().between(at(100), at(300))))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive() {
        let page = store()
            .search(&query(
                SearchQuery::builder()
                    .between(at(0), at(1000))
                    .contains("BODHI"),
            ))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["b"]);
    }

    #[tokio::test]
    async fn test_count_get_and_append() {
        let store = store();
        assert_eq!(store.count_all().await.unwrap(), 4);

        let criteria = Criteria {
            filters: crate::filters::Filters {
                users: crate::filters::FilterSet::new(["alice"], Vec::<String>::new()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(store.count(&criteria).await.unwrap(), 2);

        assert!(store.get_message("b").await.unwrap().is_some());
        assert!(store.get_message("zzz").await.unwrap().is_none());

        assert!(store.append(msg("b", 1, "git", "x")).await.is_err());
        store.append(msg("e", 1, "git", "x")).await.unwrap();
        assert_eq!(store.len().await, 5);
    }
}
