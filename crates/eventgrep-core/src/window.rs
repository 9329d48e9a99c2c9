//! Time-window resolution
//!
//! Reconciles `start`, `end`, `delta` and the configured default delta into a
//! single well-ordered window. Which inputs were supplied is captured once in
//! [`WindowInputs`]; [`resolve_window`] is then a priority-ordered rule table
//! over that enum, first match wins.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Half-open `[start, end)` interval. A missing bound means "no bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a window from two optional bounds, rejecting inverted ones.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(Error::invalid(format!(
                "start ({}) must not be after end ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a bounded window from two instants in either order.
    pub fn between(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        if a <= b {
            Self {
                start: Some(a),
                end: Some(b),
            }
        } else {
            Self {
                start: Some(b),
                end: Some(a),
            }
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// `end - start`, when both bounds exist.
    pub fn span(&self) -> Option<TimeDelta> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| instant >= start)
            && self.end.is_none_or(|end| instant < end)
    }
}

/// Which of `start`, `end` and `delta` the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowInputs {
    StartEnd {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    StartDelta {
        start: DateTime<Utc>,
        delta: TimeDelta,
    },
    EndDelta {
        end: DateTime<Utc>,
        delta: TimeDelta,
    },
    DeltaOnly {
        delta: TimeDelta,
    },
    StartOnly {
        start: DateTime<Utc>,
    },
    EndOnly {
        end: DateTime<Utc>,
    },
    Nothing,
}

impl WindowInputs {
    /// Classify the supplied inputs. A `delta` next to both bounds is ignored.
    pub fn classify(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        delta: Option<TimeDelta>,
    ) -> Self {
        match (start, end, delta) {
            (Some(start), Some(end), _) => WindowInputs::StartEnd { start, end },
            (Some(start), None, Some(delta)) => WindowInputs::StartDelta { start, delta },
            (None, Some(end), Some(delta)) => WindowInputs::EndDelta { end, delta },
            (None, None, Some(delta)) => WindowInputs::DeltaOnly { delta },
            (Some(start), None, None) => WindowInputs::StartOnly { start },
            (None, Some(end), None) => WindowInputs::EndOnly { end },
            (None, None, None) => WindowInputs::Nothing,
        }
    }
}

/// Resolve the supplied inputs into one window.
///
/// Windows derived from a delta are always sorted, so a negative delta moves
/// the derived bound to the other side instead of inverting the window.
pub fn resolve_window(
    inputs: WindowInputs,
    now: DateTime<Utc>,
    default_delta: Option<TimeDelta>,
) -> Result<TimeWindow> {
    let window = match (inputs, default_delta) {
        (WindowInputs::StartEnd { start, end }, _) => TimeWindow::new(Some(start), Some(end))?,
        (WindowInputs::StartDelta { start, delta }, _) => {
            TimeWindow::between(start, shift(start, delta)?)
        }
        (WindowInputs::EndDelta { end, delta }, _) => {
            TimeWindow::between(shift(end, -delta)?, end)
        }
        (WindowInputs::DeltaOnly { delta }, _) => TimeWindow::between(shift(now, -delta)?, now),
        (WindowInputs::StartOnly { start }, Some(default)) => {
            TimeWindow::between(start, shift(start, default)?)
        }
        (WindowInputs::StartOnly { start }, None) => TimeWindow {
            start: Some(start),
            end: None,
        },
        (WindowInputs::EndOnly { end }, Some(default)) => {
            TimeWindow::between(shift(end, -default)?, end)
        }
        (WindowInputs::EndOnly { end }, None) => TimeWindow {
            start: None,
            end: Some(end),
        },
        (WindowInputs::Nothing, Some(default)) => TimeWindow::between(shift(now, -default)?, now),
        (WindowInputs::Nothing, None) => TimeWindow::unbounded(),
    };

    Ok(window)
}

fn shift(instant: DateTime<Utc>, delta: TimeDelta) -> Result<DateTime<Utc>> {
    instant
        .checked_add_signed(delta)
        .ok_or_else(|| Error::invalid("delta moves the window outside the supported time range"))
}

/// Parse a timestamp given as Unix epoch seconds (integer or fractional) or as
/// an ISO-8601 string carrying an offset.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid("timestamp must not be empty"));
    }

    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::invalid(format!("timestamp '{}' is out of range", raw)));
    }

    if let Ok(secs) = raw.parse::<f64>() {
        if !secs.is_finite() {
            return Err(Error::invalid(format!("timestamp '{}' is not finite", raw)));
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
        return DateTime::from_timestamp(whole as i64, nanos)
            .ok_or_else(|| Error::invalid(format!("timestamp '{}' is out of range", raw)));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    // ISO-8601 with a compact offset, e.g. 2012-01-02T03:04:05+0000
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(Error::invalid(format!(
        "'{}' is neither a Unix timestamp nor an ISO-8601 datetime with offset",
        raw
    )))
}

/// Parse a relative duration in seconds. Negative and fractional values are allowed.
pub fn parse_delta(raw: &str) -> Result<TimeDelta> {
    let raw = raw.trim();

    if let Ok(secs) = raw.parse::<i64>() {
        return TimeDelta::try_seconds(secs)
            .ok_or_else(|| Error::invalid(format!("delta '{}' is out of range", raw)));
    }

    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() => {
            let millis = (secs * 1000.0).round();
            if millis.abs() >= i64::MAX as f64 {
                return Err(Error::invalid(format!("delta '{}' is out of range", raw)));
            }
            TimeDelta::try_milliseconds(millis as i64)
                .ok_or_else(|| Error::invalid(format!("delta '{}' is out of range", raw)))
        }
        _ => Err(Error::invalid(format!(
            "delta must be a number of seconds, got '{}'",
            raw
        ))),
    }
}
