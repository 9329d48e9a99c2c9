//! Message and ordering types shared by the planner and the stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A stored event message. Owned by the store; the core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier, also the pagination tie-breaker
    pub msg_id: String,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub category: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Message {
    /// Values this message carries for one filter dimension.
    pub fn values(&self, dimension: Dimension) -> &[String] {
        match dimension {
            Dimension::User => &self.users,
            Dimension::Package => &self.packages,
            Dimension::Category => std::slice::from_ref(&self.category),
            Dimension::Topic => std::slice::from_ref(&self.topic),
        }
    }

    /// Case-insensitive substring match over summary and body.
    ///
    /// `needle_lower` must already be lowercased.
    pub fn text_contains(&self, needle_lower: &str) -> bool {
        if let Some(ref summary) = self.summary
            && summary.to_lowercase().contains(needle_lower)
        {
            return true;
        }

        self.body_text()
            .is_some_and(|body| body.to_lowercase().contains(needle_lower))
    }

    /// The body as substring search sees it: string bodies as their raw text,
    /// any other JSON as its compact serialization, and nothing for null.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        match &self.body {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(Cow::Borrowed(text)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

/// Timestamp sort order. Ties always break on `msg_id` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    /// Newest first (default)
    #[default]
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

impl FromStr for Order {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            other => Err(Error::invalid(format!(
                "order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Asc => write!(f, "asc"),
            Order::Desc => write!(f, "desc"),
        }
    }
}

/// A filterable message attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    User,
    Package,
    Category,
    Topic,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::User,
        Dimension::Package,
        Dimension::Category,
        Dimension::Topic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::User => "user",
            Dimension::Package => "package",
            Dimension::Category => "category",
            Dimension::Topic => "topic",
        }
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "users" => Ok(Dimension::User),
            "package" | "packages" => Ok(Dimension::Package),
            "category" | "categories" => Ok(Dimension::Category),
            "topic" | "topics" => Ok(Dimension::Topic),
            other => Err(Error::invalid(format!("unknown dimension '{}'", other))),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
