//! Pagination helpers shared by list endpoints.

use serde::{Deserialize, Serialize};

/// Raw `?page=&page_size=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Normalized, bounds-checked paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    /// Clamp raw paging input.
    ///
    /// - `page` below 1 (or missing) becomes 1
    /// - `page_size` below 1 (or missing) becomes `default_size`
    /// - `page_size` above `max_size` becomes `max_size`
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_size: i64, max_size: i64) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s >= 1)
            .unwrap_or(default_size)
            .min(max_size);

        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn new(list: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            list,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            list: self.list.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_missing() {
        let p = Pagination::new(None, None, 20, 100);
        assert_eq!(p, Pagination { page: 1, page_size: 20 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn non_positive_values_fall_back() {
        assert_eq!(
            Pagination::new(Some(0), Some(0), 20, 100),
            Pagination { page: 1, page_size: 20 }
        );
        assert_eq!(
            Pagination::new(Some(-3), Some(-1), 20, 100),
            Pagination { page: 1, page_size: 20 }
        );
    }

    #[test]
    fn page_size_is_capped() {
        let p = Pagination::new(Some(2), Some(500), 20, 100);
        assert_eq!(p.page_size, 100);
        assert_eq!(p.offset(), 100);
    }

    #[test]
    fn offset_uses_page_and_size() {
        let p = Pagination::new(Some(3), Some(10), 20, 100);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let p = Pagination::new(Some(i64::MAX), Some(100), 20, 100);
        assert_eq!(p.offset(), i64::MAX);
    }
}
