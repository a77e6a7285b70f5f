//! Pagination for lists merged in memory.
//!
//! Lists built from a single upstream call take their totals from response
//! headers. Lists merged locally (guest customers, multi-status comments) are
//! paginated here instead.

use serde::{Deserialize, Serialize};

/// Pagination metadata returned alongside every list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Build metadata for a list of `total` items.
    #[must_use]
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages: total_pages(total, per_page),
        }
    }

    /// Build metadata when the upstream source already reported both totals.
    #[must_use]
    pub const fn from_upstream(page: u32, per_page: u32, total: u64, total_pages: u64) -> Self {
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// `ceil(total / per_page)`; zero when `per_page` is zero.
#[must_use]
pub fn total_pages(total: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(u64::from(per_page))
}

/// Clamp a requested page size into `1..=max`.
#[must_use]
pub fn clamp_per_page(requested: u32, max: u32) -> u32 {
    requested.clamp(1, max.max(1))
}

/// Slice one 1-based page out of `items`.
///
/// Page 0 is treated as page 1. Pages past the end yield an empty slice.
#[must_use]
pub fn paginate<T>(items: &[T], page: u32, per_page: u32) -> &[T] {
    let page = usize::try_from(page.max(1)).unwrap_or(usize::MAX);
    let per_page = usize::try_from(per_page).unwrap_or(usize::MAX);
    let start = (page - 1).saturating_mul(per_page);
    let end = start.saturating_add(per_page).min(items.len());
    items.get(start..end).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<u32> = (1..=5).collect();
        assert_eq!(paginate(&items, 1, 2), &[1, 2]);
        assert_eq!(paginate(&items, 3, 2), &[5]);
        assert!(paginate(&items, 4, 2).is_empty());
        assert_eq!(paginate(&items, 0, 2), &[1, 2]);
        assert!(paginate(&items, 1, 0).is_empty());
    }

    #[test]
    fn test_pages_reassemble_the_full_list() {
        for n in 0..40_u32 {
            let items: Vec<u32> = (0..n).collect();
            for per_page in 1..12_u32 {
                let pages = total_pages(u64::from(n), per_page);
                let mut joined = Vec::new();
                for page in 1..=u32::try_from(pages).unwrap_or(0) {
                    let chunk = paginate(&items, page, per_page);
                    assert!(!chunk.is_empty());
                    joined.extend_from_slice(chunk);
                }
                assert_eq!(joined, items, "n={n} per_page={per_page}");
                let next = u32::try_from(pages).unwrap_or(0) + 1;
                assert!(paginate(&items, next, per_page).is_empty());
            }
        }
    }

    #[test]
    fn test_clamp_per_page() {
        assert_eq!(clamp_per_page(0, 100), 1);
        assert_eq!(clamp_per_page(250, 100), 100);
        assert_eq!(clamp_per_page(20, 100), 20);
    }

    #[test]
    fn test_pagination_serializes_flat() {
        let json = serde_json::to_value(Pagination::new(2, 10, 25)).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({"page": 2, "per_page": 10, "total": 25, "total_pages": 3})
        );
    }
}
