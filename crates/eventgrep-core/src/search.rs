//! Search query resolution
//!
//! Turns loosely specified request parameters into one fully resolved
//! [`SearchQuery`]: window, filter sets, substring terms, page, page size and
//! order. Resolution is pure; `now` and the configuration are passed in.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::QueryConfig;
use crate::filters::{FilterSet, Filters, normalize_terms};
use crate::params::RawParams;
use crate::types::{Dimension, Message, Order};
use crate::window::{TimeWindow, WindowInputs, parse_delta, parse_timestamp, resolve_window};
use crate::{Error, Result};

/// Returned whenever a substring search is not confined to a short enough window.
pub const UNBOUNDED_SEARCH_MESSAGE: &str = "When using contains, specify a start at most eight months \
     into the past, or a delta of at most eight months, so the search covers a bounded window";

/// What to match, independent of how the matches are paged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub window: TimeWindow,
    pub filters: Filters,
    /// Case-insensitive substrings; a message matches when any term occurs
    #[serde(default)]
    pub contains: BTreeSet<String>,
}

impl Criteria {
    pub fn matches(&self, message: &Message) -> bool {
        self.window.contains(message.timestamp)
            && self.filters.matches(message)
            && (self.contains.is_empty()
                || self
                    .contains
                    .iter()
                    .any(|term| message.text_contains(&term.to_lowercase())))
    }

    /// Same criteria over a different window.
    pub fn with_window(&self, window: TimeWindow) -> Self {
        Self {
            window,
            ..self.clone()
        }
    }
}

/// A fully resolved, validated search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub criteria: Criteria,
    /// 1-indexed
    pub page: u32,
    pub rows_per_page: u32,
    pub order: Order,
}

impl SearchQuery {
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::default()
    }

    /// Number of matches skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.rows_per_page)
    }

    pub fn window(&self) -> &TimeWindow {
        &self.criteria.window
    }

    /// Validate paging inputs, clamp the page size and run the substring guard.
    fn assemble(
        criteria: Criteria,
        page: i64,
        rows_per_page: i64,
        order: Order,
        now: DateTime<Utc>,
        config: &QueryConfig,
    ) -> Result<Self> {
        if page <= 0 {
            return Err(Error::invalid(format!(
                "page must be a positive integer, got {}",
                page
            )));
        }
        let page = u32::try_from(page)
            .map_err(|_| Error::invalid(format!("page {} is too large", page)))?;

        if rows_per_page <= 0 {
            return Err(Error::invalid(format!(
                "rows_per_page must be a positive integer, got {}",
                rows_per_page
            )));
        }
        let max_rows = i64::from(config.max_rows_per_page);
        let rows_per_page = rows_per_page.min(max_rows) as u32;

        let max_window = TimeDelta::try_seconds(config.max_search_window)
            .ok_or_else(|| Error::Config("max_search_window is out of range".to_string()))?;
        check_contains_window(&criteria.window, &criteria.contains, now, max_window)?;

        Ok(Self {
            criteria,
            page,
            rows_per_page,
            order,
        })
    }
}

/// Resolve raw request parameters into a [`SearchQuery`].
///
/// With no parameters at all this yields page 1, the default page size,
/// descending order, no filters, and the default window (unbounded unless a
/// default delta is configured).
pub fn resolve(raw: &RawParams, now: DateTime<Utc>, config: &QueryConfig) -> Result<SearchQuery> {
    let start = raw.start.as_deref().map(parse_timestamp).transpose()?;
    let end = raw.end.as_deref().map(parse_timestamp).transpose()?;
    let delta = raw.delta.as_deref().map(parse_delta).transpose()?;
    let default_delta = config
        .effective_default_delta()
        .map(|secs| {
            TimeDelta::try_seconds(secs)
                .ok_or_else(|| Error::Config("default_query_delta is out of range".to_string()))
        })
        .transpose()?;

    let window = resolve_window(WindowInputs::classify(start, end, delta), now, default_delta)?;

    let filters = Filters {
        users: FilterSet::parse(Dimension::User, &raw.user, &raw.not_user)?,
        packages: FilterSet::parse(Dimension::Package, &raw.package, &raw.not_package)?,
        categories: FilterSet::parse(Dimension::Category, &raw.category, &raw.not_category)?,
        topics: FilterSet::parse(Dimension::Topic, &raw.topic, &raw.not_topic)?,
    };
    let contains = normalize_terms(&raw.contains)?;

    let page = raw
        .page
        .as_deref()
        .map(|p| parse_integer("page", p))
        .transpose()?
        .unwrap_or(1);
    let rows_per_page = raw
        .rows_per_page
        .as_deref()
        .map(|r| parse_integer("rows_per_page", r))
        .transpose()?
        .unwrap_or_else(|| i64::from(config.default_rows_per_page));
    let order = raw
        .order
        .as_deref()
        .map(str::parse::<Order>)
        .transpose()?
        .unwrap_or_default();

    SearchQuery::assemble(
        Criteria {
            window,
            filters,
            contains,
        },
        page,
        rows_per_page,
        order,
        now,
        config,
    )
}

/// Substring search must scan a bounded window no longer than `max_window`.
///
/// Skipped entirely when there are no terms. An open end is measured against
/// `now`, since nothing newer than `now` can exist in an append-only log.
pub fn check_contains_window(
    window: &TimeWindow,
    contains: &BTreeSet<String>,
    now: DateTime<Utc>,
    max_window: TimeDelta,
) -> Result<()> {
    if contains.is_empty() {
        return Ok(());
    }

    let Some(start) = window.start else {
        return Err(Error::UnboundedSearch(UNBOUNDED_SEARCH_MESSAGE.to_string()));
    };
    let end = window.end.unwrap_or(now);

    match end.signed_duration_since(start) {
        span if span <= max_window => Ok(()),
        _ => Err(Error::UnboundedSearch(UNBOUNDED_SEARCH_MESSAGE.to_string())),
    }
}

fn parse_integer(name: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| Error::invalid(format!("{} must be an integer, got '{}'", name, raw)))
}

/// Builder for programmatic callers that already hold typed values
#[derive(Debug)]
pub struct SearchQueryBuilder {
    criteria: Criteria,
    page: i64,
    rows_per_page: Option<i64>,
    order: Order,
}

impl Default for SearchQueryBuilder {
    fn default() -> Self {
        Self {
            criteria: Criteria::default(),
            page: 1,
            rows_per_page: None,
            order: Order::default(),
        }
    }
}

impl SearchQueryBuilder {
    pub fn window(mut self, window: TimeWindow) -> Self {
        self.criteria.window = window;
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.criteria.window = TimeWindow::between(start, end);
        self
    }

    pub fn filter(mut self, dimension: Dimension, set: FilterSet) -> Self {
        *self.criteria.filters.get_mut(dimension) = set;
        self
    }

    pub fn include(mut self, dimension: Dimension, value: impl Into<String>) -> Self {
        self.criteria
            .filters
            .get_mut(dimension)
            .include
            .insert(value.into());
        self
    }

    pub fn exclude(mut self, dimension: Dimension, value: impl Into<String>) -> Self {
        self.criteria
            .filters
            .get_mut(dimension)
            .exclude
            .insert(value.into());
        self
    }

    pub fn contains(mut self, term: impl Into<String>) -> Self {
        self.criteria.contains.insert(term.into());
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn rows_per_page(mut self, rows: i64) -> Self {
        self.rows_per_page = Some(rows);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn build(self, now: DateTime<Utc>, config: &QueryConfig) -> Result<SearchQuery> {
        if self.criteria.contains.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::invalid("contains must not be empty"));
        }
        let rows = self
            .rows_per_page
            .unwrap_or_else(|| i64::from(config.default_rows_per_page));
        SearchQuery::assemble(self.criteria, self.page, rows, self.order, now, config)
    }
}
