//! Time-bucketed aggregation for charts
//!
//! A chart request is planned first (bucket bounds and one criteria set per
//! series) and then run by counting each bucket through the store. Buckets
//! tile the window `[start, end)` contiguously, so every matching message is
//! counted in exactly one bucket and empty buckets are reported as zero.

use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::config::QueryConfig;
use crate::search::Criteria;
use crate::types::Dimension;
use crate::window::TimeWindow;
use crate::{Error, Result};

/// Bucket counts requested concurrently per series
const COUNT_CONCURRENCY: usize = 8;

/// Label of the single series produced when no split is requested
pub const ALL_MESSAGES_LABEL: &str = "messages";

/// How to bucket a chart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRequest {
    /// Bucket width in seconds. Overrides `intervals` when set.
    #[serde(default)]
    pub interval: Option<i64>,

    /// Number of equal buckets; falls back to the configured `chart_intervals`
    #[serde(default)]
    pub intervals: Option<u32>,

    /// Produce one series per include value of this dimension
    #[serde(default)]
    pub split_on: Option<Dimension>,
}

impl ChartRequest {
    pub fn with_interval(secs: i64) -> Self {
        Self {
            interval: Some(secs),
            ..Default::default()
        }
    }

    pub fn split_on(mut self, dimension: Dimension) -> Self {
        self.split_on = Some(dimension);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub count: u64,
}

/// Contiguous buckets covering one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSeries {
    pub buckets: Vec<Bucket>,
}

impl BucketSeries {
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    pub series: BucketSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartResult {
    pub series: Vec<ChartSeries>,
}

impl ChartResult {
    /// Sum over every series. Split series can overlap, so this may exceed
    /// the number of distinct matching messages.
    pub fn total(&self) -> u64 {
        self.series.iter().map(|s| s.series.total()).sum()
    }
}

/// Bucket bounds plus the criteria to count for each series
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub buckets: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub series: Vec<(String, Criteria)>,
}

/// Validate a chart request and lay out its buckets and series.
pub fn plan(
    criteria: &Criteria,
    request: &ChartRequest,
    config: &QueryConfig,
) -> Result<AggregationPlan> {
    let (Some(start), Some(end)) = (criteria.window.start, criteria.window.end) else {
        return Err(Error::invalid(
            "charts require a bounded window; supply start and end, or a delta",
        ));
    };

    let buckets = match request.interval {
        Some(secs) => fixed_width_buckets(start, end, secs, config.max_chart_buckets)?,
        None => {
            let intervals = request.intervals.unwrap_or(config.chart_intervals);
            if intervals == 0 {
                return Err(Error::invalid("intervals must be greater than 0"));
            }
            if intervals > config.max_chart_buckets {
                return Err(Error::invalid(format!(
                    "intervals {} exceeds maximum of {} buckets",
                    intervals, config.max_chart_buckets
                )));
            }
            equal_buckets(start, end, intervals)
        }
    };

    let series = match request.split_on {
        None => vec![(ALL_MESSAGES_LABEL.to_string(), criteria.clone())],
        Some(dimension) => {
            let set = criteria.filters.get(dimension);
            if set.include.is_empty() {
                return Err(Error::invalid(format!(
                    "split_on={} requires at least one {} value",
                    dimension, dimension
                )));
            }
            set.include
                .iter()
                .map(|value| {
                    let mut narrowed = criteria.clone();
                    *narrowed.filters.get_mut(dimension) = set.narrowed_to(value);
                    (value.clone(), narrowed)
                })
                .collect()
        }
    };

    Ok(AggregationPlan { buckets, series })
}

/// Count every bucket of every series with the supplied counting function.
pub async fn run<F, Fut>(plan: AggregationPlan, count: F) -> Result<ChartResult>
where
    F: Fn(Criteria) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let mut result = ChartResult::default();

    for (label, criteria) in plan.series {
        let counts: Vec<u64> = futures::stream::iter(plan.buckets.iter().map(|&(start, end)| {
            count(criteria.with_window(TimeWindow {
                start: Some(start),
                end: Some(end),
            }))
        }))
        .buffered(COUNT_CONCURRENCY)
        .try_collect()
        .await?;

        let buckets = plan
            .buckets
            .iter()
            .zip(counts)
            .map(|(&(bucket_start, bucket_end), count)| Bucket {
                bucket_start,
                bucket_end,
                count,
            })
            .collect();

        result.series.push(ChartSeries {
            label,
            series: BucketSeries { buckets },
        });
    }

    Ok(result)
}

/// Buckets of `width_secs`, the last one truncated at `end`.
fn fixed_width_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    width_secs: i64,
    max_buckets: u32,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    if width_secs <= 0 {
        return Err(Error::invalid(format!(
            "interval must be a positive number of seconds, got {}",
            width_secs
        )));
    }
    let width = TimeDelta::try_seconds(width_secs)
        .ok_or_else(|| Error::invalid(format!("interval {} is out of range", width_secs)))?;

    let span_ns = total_nanos(end - start);
    let width_ns = total_nanos(width);
    let needed = (span_ns + width_ns - 1) / width_ns;
    if needed > i128::from(max_buckets) {
        return Err(Error::invalid(format!(
            "interval {}s would produce {} buckets, maximum is {}",
            width_secs, needed, max_buckets
        )));
    }

    let mut buckets = Vec::with_capacity(needed as usize);
    let mut cursor = start;
    while cursor < end {
        let next = cursor
            .checked_add_signed(width)
            .map_or(end, |next| next.min(end));
        buckets.push((cursor, next));
        cursor = next;
    }
    Ok(buckets)
}

/// `intervals` buckets splitting the window evenly to the nanosecond.
///
/// A window shorter than `intervals` nanoseconds gets one bucket per
/// nanosecond instead, so no bucket is ever empty in width.
fn equal_buckets(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    intervals: u32,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let span_ns = total_nanos(end - start);
    if span_ns <= 0 {
        return Vec::new();
    }

    let n = i128::from(intervals).min(span_ns);
    let boundary = |i: i128| {
        if i == n {
            return end;
        }
        from_nanos(span_ns * i / n)
            .and_then(|offset| start.checked_add_signed(offset))
            .unwrap_or(end)
    };

    (0..n).map(|i| (boundary(i), boundary(i + 1))).collect()
}

/// Full-precision length of a duration in nanoseconds.
fn total_nanos(delta: TimeDelta) -> i128 {
    i128::from(delta.num_seconds()) * 1_000_000_000 + i128::from(delta.subsec_nanos())
}

fn from_nanos(nanos: i128) -> Option<TimeDelta> {
    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
    let subsec = u32::try_from(nanos.rem_euclid(1_000_000_000)).ok()?;
    TimeDelta::new(secs, subsec)
}
