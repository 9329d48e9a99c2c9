//! Query configuration
//!
//! Passed explicitly into the resolver and the engine on every request so the
//! core never reads process-wide state.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Eight months, expressed as 240 days of seconds.
pub const EIGHT_MONTHS_SECS: i64 = 240 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Window length (seconds) synthesized when only one bound, or none, is given.
    /// Absent or zero means "not configured".
    #[serde(default)]
    pub default_query_delta: Option<i64>,

    #[serde(default = "default_rows_per_page")]
    pub default_rows_per_page: u32,

    /// Requests above this are clamped, not rejected.
    #[serde(default = "default_max_rows_per_page")]
    pub max_rows_per_page: u32,

    /// Longest window (seconds) a `contains` search may scan.
    #[serde(default = "default_max_search_window")]
    pub max_search_window: i64,

    /// Number of buckets a chart is split into when no width is requested.
    #[serde(default = "default_chart_intervals")]
    pub chart_intervals: u32,

    #[serde(default = "default_max_chart_buckets")]
    pub max_chart_buckets: u32,

    /// Upper bound on any single storage call (None = wait indefinitely)
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_query_delta: None,
            default_rows_per_page: default_rows_per_page(),
            max_rows_per_page: default_max_rows_per_page(),
            max_search_window: default_max_search_window(),
            chart_intervals: default_chart_intervals(),
            max_chart_buckets: default_max_chart_buckets(),
            storage_timeout_secs: default_storage_timeout_secs(),
        }
    }
}

impl QueryConfig {
    /// The configured default delta, treating zero as unset.
    pub fn effective_default_delta(&self) -> Option<i64> {
        self.default_query_delta.filter(|delta| *delta != 0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_page == 0 {
            return Err(Error::Config(
                "max_rows_per_page must be greater than 0".to_string(),
            ));
        }

        if self.default_rows_per_page == 0 {
            return Err(Error::Config(
                "default_rows_per_page must be greater than 0".to_string(),
            ));
        }

        if self.default_rows_per_page > self.max_rows_per_page {
            return Err(Error::Config(format!(
                "default_rows_per_page {} exceeds max_rows_per_page {}",
                self.default_rows_per_page, self.max_rows_per_page
            )));
        }

        if let Some(delta) = self.default_query_delta {
            if delta < 0 {
                return Err(Error::Config(format!(
                    "default_query_delta must not be negative, got {}",
                    delta
                )));
            }
            if TimeDelta::try_seconds(delta).is_none() {
                return Err(Error::Config(format!(
                    "default_query_delta {} is out of range",
                    delta
                )));
            }
        }

        if self.max_search_window <= 0 {
            return Err(Error::Config(
                "max_search_window must be a positive number of seconds".to_string(),
            ));
        }
        if TimeDelta::try_seconds(self.max_search_window).is_none() {
            return Err(Error::Config(format!(
                "max_search_window {} is out of range",
                self.max_search_window
            )));
        }

        if self.chart_intervals == 0 {
            return Err(Error::Config(
                "chart_intervals must be greater than 0".to_string(),
            ));
        }

        if self.chart_intervals > self.max_chart_buckets {
            return Err(Error::Config(format!(
                "chart_intervals {} exceeds max_chart_buckets {}",
                self.chart_intervals, self.max_chart_buckets
            )));
        }

        if self.storage_timeout_secs == Some(0) {
            return Err(Error::Config(
                "storage_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_rows_per_page() -> u32 {
    25
}

fn default_max_rows_per_page() -> u32 {
    100
}

fn default_max_search_window() -> i64 {
    EIGHT_MONTHS_SECS
}

fn default_chart_intervals() -> u32 {
    10
}

fn default_max_chart_buckets() -> u32 {
    1000
}

fn default_storage_timeout_secs() -> Option<u64> {
    Some(30)
}
