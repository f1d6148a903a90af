//! Pagination types for repository reads.
//!
//! [`PaginationParams`] selects a page of a filtered find. [`Page`] carries the decoded
//! items together with the total count and the neighbouring page numbers.

use serde::{Deserialize, Serialize};

use crate::options::FindOptions;

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use docrepo_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Number of documents matching the filter across all pages.
    pub count: u64,
    /// The next page number, if more documents follow.
    pub next_page: Option<u64>,
    /// The previous page number, if this is not the first page.
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<u64>,
    previous_page: Option<u64>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<u64>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<u64>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to read and how large pages are. Pages are 1-indexed.
///
/// ```ignore
/// use docrepo_core::page::PaginationParams;
///
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.offset(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: u64,
    /// Number of items per page.
    pub per_page: u64,
}

impl PaginationParams {
    /// Creates pagination parameters. A page below 1 is clamped to 1, and so is a page
    /// size of 0.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    fn page_number(&self) -> u64 {
        self.page.max(1)
    }

    // Deserialized params bypass `new`, so every reader clamps again.
    fn page_size(&self) -> u64 {
        self.per_page.max(1)
    }

    /// Number of documents to skip to reach this page. Saturates at `u64::MAX`.
    pub fn offset(&self) -> u64 {
        (self.page_number() - 1).saturating_mul(self.page_size())
    }

    pub fn to_find_options(&self) -> FindOptions {
        FindOptions::default()
            .with_skip(self.offset())
            .with_limit(i64::try_from(self.page_size()).unwrap_or(i64::MAX))
    }

    /// Wraps the items read for this page, given the total matching `count`.
    pub fn page_of<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let page = self.page_number();
        let end = self.offset().saturating_add(items.len() as u64);
        let next_page = if end < count { page.checked_add(1) } else { None };

        Page::builder(items)
            .with_count(count)
            .with_next_page(next_page)
            .with_previous_page((page > 1).then(|| page - 1))
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PaginationParams::new(3, 20).offset(), 40);
        assert_eq!(PaginationParams::new(0, 20).offset(), 0);
    }

    #[test]
    fn find_options_carry_skip_and_limit() {
        let options = PaginationParams::new(2, 5).to_find_options();

        assert_eq!(options.skip, Some(5));
        assert_eq!(options.limit, Some(5));
    }

    #[test]
    fn middle_page_links_both_neighbours() {
        let page = PaginationParams::new(2, 10).page_of(vec![0; 10], 35);

        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PaginationParams::new(4, 10).page_of(vec![0; 5], 35);

        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(3));
    }

    #[test]
    fn huge_pages_saturate_instead_of_overflowing() {
        let params = PaginationParams::new(u64::MAX, 2);
        assert_eq!(params.offset(), u64::MAX);

        let options = PaginationParams::new(2, u64::MAX).to_find_options();
        assert_eq!(options.skip, Some(u64::MAX));
        assert_eq!(options.limit, Some(i64::MAX));

        let page = params.page_of(vec![1, 2], u64::MAX);
        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(u64::MAX - 1));
    }

    #[test]
    fn zero_page_size_reads_one_document() {
        assert_eq!(PaginationParams::new(3, 0).to_find_options().limit, Some(1));

        let deserialized = PaginationParams { page: 3, per_page: 0 };
        assert_eq!(deserialized.offset(), 2);
        assert_eq!(deserialized.to_find_options().limit, Some(1));
    }
}
