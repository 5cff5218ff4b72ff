//! Page/limit pagination for message history.
//!
//! Page 1 is the most recent `limit` messages; higher pages walk back in
//! time. Each page is returned oldest-to-newest.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 30;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// Clamp to page >= 1 and 1 <= limit <= MAX_PAGE_LIMIT
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Number of newest messages to skip
    pub fn offset(&self) -> usize {
        let normalized = self.normalized();
        (normalized.page as usize - 1) * normalized.limit as usize
    }

    pub fn limit(&self) -> usize {
        self.normalized().limit as usize
    }
}
