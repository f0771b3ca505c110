//! Pagination of ordered entry sets

use serde::Serialize;

/// Entries per page when the caller does not say
pub const DEFAULT_PER_PAGE: usize = 25;

/// Supplies the 1-based page number when none is passed explicitly,
/// e.g. from a request query string
pub trait PageSource: Send + Sync {
    fn current_page(&self) -> Option<usize>;
}

/// One page of an ordered sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole sequence
    pub total: usize,
    pub per_page: usize,
    pub current_page: usize,
    pub last_page: usize,
}

impl<T> Page<T> {
    /// Slice page `page` out of `all`
    ///
    /// Pages below 1 are treated as page 1 and a zero page size as 1. A page
    /// past the end is empty but still reports the totals.
    pub fn from_items(all: Vec<T>, per_page: usize, page: usize) -> Self {
        let per_page = per_page.max(1);
        let current_page = page.max(1);
        let total = all.len();
        let last_page = total.div_ceil(per_page).max(1);
        let offset = (current_page - 1).saturating_mul(per_page);

        let items = all.into_iter().skip(offset).take(per_page).collect();

        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 1-based position of the first item on this page, if any
    pub fn first_item(&self) -> Option<usize> {
        if self.items.is_empty() {
            None
        } else {
            Some((self.current_page - 1) * self.per_page + 1)
        }
    }
}
