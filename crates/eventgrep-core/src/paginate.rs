//! Result pagination envelope

use serde::{Deserialize, Serialize};

use crate::store::StorePage;

/// Response envelope for one page of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Items on this page; short on the last page
    pub count: usize,

    /// Matches across all pages
    pub total: u64,

    /// Zero when there is nothing to paginate
    pub pages: u64,

    pub items: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total: u64, rows_per_page: u32) -> Self {
        Self {
            count: items.len(),
            total,
            pages: page_count(total, rows_per_page),
            items,
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            total: 0,
            pages: 0,
            items: Vec::new(),
        }
    }

    pub fn has_next_page(&self, page: u32) -> bool {
        u64::from(page) < self.pages
    }

    pub fn has_prev_page(&self, page: u32) -> bool {
        page > 1 && self.pages > 0
    }
}

impl PageResult<crate::types::Message> {
    /// Shape a store page into the envelope.
    ///
    /// The page count is recomputed from `total` rather than trusted from the
    /// store, so `pages == 0` exactly when `total == 0`.
    pub fn from_store(page: StorePage, rows_per_page: u32) -> Self {
        Self::new(page.items, page.total, rows_per_page)
    }
}

/// `ceil(total / rows_per_page)`, or 0 when there is nothing to paginate.
pub fn page_count(total: u64, rows_per_page: u32) -> u64 {
    if total == 0 || rows_per_page == 0 {
        0
    } else {
        total.div_ceil(u64::from(rows_per_page))
    }
}
