//! Pagination utilities for list endpoints

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sanitized page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    /// Clamp raw query values: page >= 1, 1 <= page_size <= MAX_PAGE_SIZE
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Offset for SQL LIMIT/OFFSET
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Paginated list response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, pagination: Pagination) -> Self {
        let total_pages = (count + pagination.page_size - 1) / pagination.page_size;
        Self {
            count,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 20);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_clamping() {
        let p = Pagination::new(Some(0), Some(1000));
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);

        let p = Pagination::new(Some(3), Some(0));
        assert_eq!(p.page_size, 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<i32> = Page::new(vec![], 45, Pagination::new(Some(1), Some(20)));
        assert_eq!(page.total_pages, 3);

        let empty: Page<i32> = Page::new(vec![], 0, Pagination::default());
        assert_eq!(empty.total_pages, 0);
    }
}
