//! Page/limit handling for list queries.

use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest accepted page size.
pub const MAX_LIMIT: u32 = 100;

/// A normalized 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Normalizes raw query values.
    ///
    /// A missing or non-positive page becomes 1. A missing limit, or one
    /// outside `1..=MAX_LIMIT`, becomes [`DEFAULT_LIMIT`].
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page
            .filter(|p| *p >= 1)
            .map_or(1, |p| u32::try_from(p).unwrap_or(u32::MAX));
        let limit = limit
            .filter(|l| (1..=i64::from(MAX_LIMIT)).contains(l))
            .map_or(DEFAULT_LIMIT, |l| l as u32);
        Self { page, limit }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}
