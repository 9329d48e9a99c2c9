//! EventGrep Core
//!
//! Query construction and pagination over an append-only log of event
//! messages:
//! - Time-window resolution (`start` / `end` / `delta` / default delta)
//! - Include/exclude filter sets per dimension
//! - The substring-search window guard
//! - Query planning and execution against a `MessageStore`
//! - Result pagination and time-bucketed chart aggregation

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filters;
pub mod memory;
pub mod paginate;
pub mod params;
pub mod planner;
pub mod search;
pub mod store;
pub mod types;
pub mod window;

pub use aggregate::{Bucket, BucketSeries, ChartRequest, ChartResult, ChartSeries};
pub use config::QueryConfig;
pub use error::{Error, Result};
pub use filters::{FilterSet, Filters};
pub use memory::InMemoryStore;
pub use paginate::PageResult;
pub use params::RawParams;
pub use planner::QueryEngine;
pub use search::{Criteria, SearchQuery, UNBOUNDED_SEARCH_MESSAGE, resolve};
pub use store::{MessageStore, StorePage};
pub use types::{Dimension, Message, Order};
pub use window::TimeWindow;
