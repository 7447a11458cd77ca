//! Deterministic pagination over ledger, board and leaderboard queries
//!
//! `limit`/`skip` arrive from query strings as signed values so that negative
//! input is reported as `InvalidRange` rather than a parse failure.

use serde::Serialize;

use crate::types::{FavorrError, Result};

/// Page size used when the caller gives none
pub const DEFAULT_LIMIT: i64 = 5;

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 100;

/// Validated `limit`/`skip` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingCursor {
    limit: i64,
    skip: i64,
}

impl ListingCursor {
    /// Validate a cursor; `limit` must be in `1..=100` and `skip` non-negative
    pub fn new(limit: i64, skip: i64) -> Result<Self> {
        if limit <= 0 {
            return Err(FavorrError::InvalidRange(format!(
                "limit must be positive, got {}",
                limit
            )));
        }
        if limit > MAX_LIMIT {
            return Err(FavorrError::InvalidRange(format!(
                "limit must be at most {}, got {}",
                MAX_LIMIT, limit
            )));
        }
        if skip < 0 {
            return Err(FavorrError::InvalidRange(format!(
                "skip must not be negative, got {}",
                skip
            )));
        }
        Ok(Self { limit, skip })
    }

    /// Cursor from optional query parameters, applying the defaults
    pub fn from_query(limit: Option<i64>, skip: Option<i64>) -> Result<Self> {
        Self::new(limit.unwrap_or(DEFAULT_LIMIT), skip.unwrap_or(0))
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        self.skip as u64
    }

    /// One-based page number: `floor(skip / limit) + 1`
    pub fn current_page(&self) -> u64 {
        (self.skip / self.limit) as u64 + 1
    }

    /// Number of pages needed for `total` items at this page size
    pub fn total_pages(&self, total: u64) -> u64 {
        let limit = self.limit as u64;
        total.div_ceil(limit)
    }

    /// Wrap one fetched page with its position metadata
    pub fn wrap<T>(&self, items: Vec<T>, total_count: u64) -> Page<T> {
        Page {
            items,
            current_page: self.current_page(),
            total_count,
            total_pages: self.total_pages(total_count),
            limit: self.limit,
            skip: self.skip,
        }
    }

    /// Slice an already ordered collection
    pub fn slice<T>(&self, ordered: Vec<T>) -> Page<T> {
        let total = ordered.len() as u64;
        let items = ordered
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect();
        self.wrap(items, total)
    }
}

impl Default for ListingCursor {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            skip: 0,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u64,
    pub total_count: u64,
    pub total_pages: u64,
    pub limit: i64,
    pub skip: i64,
}

impl<T> Page<T> {
    /// Swap in converted items, keeping the position metadata
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            current_page: self.current_page,
            total_count: self.total_count,
            total_pages: self.total_pages,
            limit: self.limit,
            skip: self.skip,
        }
    }
}

/// Position of a page within `total_count` items, without the items
pub fn page(total_count: u64, limit: i64, skip: i64) -> Result<Page<()>> {
    Ok(ListingCursor::new(limit, skip)?.wrap(Vec::new(), total_count))
}
