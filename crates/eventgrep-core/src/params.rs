//! Raw request parameters, as a serving layer hands them over.
//!
//! Every value is kept as text so that malformed input surfaces as
//! `InvalidParameter` from [`crate::resolve`] instead of a transport-level
//! decode failure. List parameters may be repeated and may be comma-separated.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParams {
    /// Unix epoch seconds or ISO-8601 with offset
    pub start: Option<String>,
    pub end: Option<String>,
    /// Seconds, may be negative
    pub delta: Option<String>,

    /// 1-indexed
    pub page: Option<String>,
    pub rows_per_page: Option<String>,
    /// `asc` or `desc`
    pub order: Option<String>,

    #[serde(alias = "users")]
    pub user: Vec<String>,
    #[serde(alias = "packages")]
    pub package: Vec<String>,
    #[serde(alias = "categories")]
    pub category: Vec<String>,
    #[serde(alias = "topics")]
    pub topic: Vec<String>,

    #[serde(alias = "not_users")]
    pub not_user: Vec<String>,
    #[serde(alias = "not_packages")]
    pub not_package: Vec<String>,
    #[serde(alias = "not_categories")]
    pub not_category: Vec<String>,
    #[serde(alias = "not_topics")]
    pub not_topic: Vec<String>,

    pub contains: Vec<String>,
}

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn delta(mut self, delta: impl Into<String>) -> Self {
        self.delta = Some(delta.into());
        self
    }

    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn rows_per_page(mut self, rows: impl Into<String>) -> Self {
        self.rows_per_page = Some(rows.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user.push(user.into());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package.push(package.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category.push(category.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic.push(topic.into());
        self
    }

    pub fn not_user(mut self, user: impl Into<String>) -> Self {
        self.not_user.push(user.into());
        self
    }

    pub fn not_package(mut self, package: impl Into<String>) -> Self {
        self.not_package.push(package.into());
        self
    }

    pub fn not_category(mut self, category: impl Into<String>) -> Self {
        self.not_category.push(category.into());
        self
    }

    pub fn not_topic(mut self, topic: impl Into<String>) -> Self {
        self.not_topic.push(topic.into());
        self
    }

    pub fn contains(mut self, term: impl Into<String>) -> Self {
        self.contains.push(term.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_accepts_plural_aliases() {
        let params: RawParams = serde_json::from_value(serde_json::json!({
            "start": "1564503781",
            "users": ["alice"],
            "not_categories": ["bodhi"],
            "contains": ["foo"]
        }))
        .unwrap();

        assert_eq!(params.start.as_deref(), Some("1564503781"));
        assert_eq!(params.user, vec!["alice"]);
        assert_eq!(params.not_category, vec!["bodhi"]);
        assert_eq!(params.contains, vec!["foo"]);
        assert!(params.end.is_none());
    }

    #[test]
    fn test_builder_accumulates_repeated_values() {
        let params = RawParams::new().user("alice").user("bob").delta("600");
        assert_eq!(params.user, vec!["alice", "bob"]);
        assert_eq!(params.delta.as_deref(), Some("600"));
    }
}
