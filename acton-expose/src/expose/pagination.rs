//! Pagination detection and normalization
//!
//! Any value that knows its current page, page size and total entry count can
//! be exposed as a paginated collection. Two shapes ship with the crate:
//! page-number pages ([`Page`]) and offset/limit windows ([`OffsetPage`]).
//!
//! # Example
//!
//! ```rust
//! use acton_expose::expose::{Page, PaginationInfo};
//!
//! let page = Page::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 2, 10, 200);
//! let info = PaginationInfo::from_source(&page);
//! assert_eq!(info.total_pages, 20);
//! assert_eq!(info.next_page, Some(3));
//! assert_eq!(info.previous_page, Some(1));
//! ```

use serde::{Deserialize, Serialize};

use super::classify::Exposable;

/// Minimal capability set for paginated values
pub trait PaginationSource {
    /// Current page, 1-indexed
    fn current_page(&self) -> u64;

    /// Maximum entries per page
    fn per_page(&self) -> u64;

    /// Entries across all pages
    fn total_entries(&self) -> u64;
}

/// Normalized pagination descriptor
///
/// Serializes with the envelope field names `count`, `per_page`, `current`,
/// `next`, `previous`, `pages`. Absent neighbours serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    /// Entries across all pages
    pub count: u64,
    /// Entries per page
    pub per_page: u64,
    /// Current page
    #[serde(rename = "current")]
    pub current_page: u64,
    /// Next page, when one exists
    #[serde(rename = "next")]
    pub next_page: Option<u64>,
    /// Previous page, when one exists
    #[serde(rename = "previous")]
    pub previous_page: Option<u64>,
    /// Total number of pages
    #[serde(rename = "pages")]
    pub total_pages: u64,
}

impl PaginationInfo {
    /// Derive the descriptor from raw numbers
    ///
    /// A zero `per_page` is treated as 1.
    ///
    /// ```rust
    /// use acton_expose::expose::PaginationInfo;
    ///
    /// let empty = PaginationInfo::new(1, 10, 0);
    /// assert_eq!(empty.total_pages, 0);
    /// assert_eq!(empty.next_page, None);
    /// assert_eq!(empty.previous_page, None);
    /// ```
    #[must_use]
    pub fn new(current_page: u64, per_page: u64, count: u64) -> Self {
        let per_page = if per_page == 0 { 1 } else { per_page };
        let total_pages = calculate_total_pages(count, per_page);
        let next_page = (current_page < total_pages).then(|| current_page + 1);
        let previous_page = (current_page > 1).then(|| current_page - 1);

        Self {
            count,
            per_page,
            current_page,
            next_page,
            previous_page,
            total_pages,
        }
    }

    /// Derive the descriptor from a pagination source
    pub fn from_source(source: &(impl PaginationSource + ?Sized)) -> Self {
        Self::new(
            source.current_page(),
            source.per_page(),
            source.total_entries(),
        )
    }

    /// First page, when there are any pages
    pub fn first_page(&self) -> Option<u64> {
        (self.total_pages > 0).then_some(1)
    }

    /// Last page, when there are any pages
    pub fn last_page(&self) -> Option<u64> {
        (self.total_pages > 0).then_some(self.total_pages)
    }
}

/// Ceiling division, 0 pages for 0 entries
fn calculate_total_pages(count: u64, per_page: u64) -> u64 {
    count.div_ceil(per_page)
}

/// Detect pagination on an exposable value
pub fn detect(value: &dyn Exposable) -> Option<PaginationInfo> {
    value
        .pagination_source()
        .map(|source| PaginationInfo::from_source(source))
}

/// One page of a page-number paginated collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Entries on this page
    pub items: Vec<T>,
    /// Current page, 1-indexed
    pub current_page: u64,
    /// Entries per page
    pub per_page: u64,
    /// Entries across all pages
    pub total_entries: u64,
}

impl<T> Page<T> {
    /// Wrap an already sliced page
    pub fn new(items: Vec<T>, current_page: u64, per_page: u64, total_entries: u64) -> Self {
        Self {
            items,
            current_page,
            per_page,
            total_entries,
        }
    }

    /// Slice page `current_page` out of a full collection
    ///
    /// ```rust
    /// use acton_expose::expose::Page;
    ///
    /// let page = Page::paginate((1..=25).collect::<Vec<_>>(), 3, 10);
    /// assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
    /// assert_eq!(page.total_entries, 25);
    /// ```
    pub fn paginate(all: Vec<T>, current_page: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        let current_page = current_page.max(1);
        let total_entries = all.len() as u64;
        let skip = usize::try_from((current_page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
        let take = usize::try_from(per_page).unwrap_or(usize::MAX);
        let items = all.into_iter().skip(skip).take(take).collect();
        Self::new(items, current_page, per_page, total_entries)
    }

    /// Map each entry, keeping the pagination numbers
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total_entries: self.total_entries,
        }
    }

    /// Entries on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> PaginationSource for Page<T> {
    fn current_page(&self) -> u64 {
        self.current_page
    }

    fn per_page(&self) -> u64 {
        self.per_page
    }

    fn total_entries(&self) -> u64 {
        self.total_entries
    }
}

/// A window of an offset/limit paginated collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetPage<T> {
    /// Entries in this window
    pub items: Vec<T>,
    /// Entries skipped before this window
    pub offset: u64,
    /// Window size
    pub limit: u64,
    /// Entries across all windows
    pub total_count: u64,
}

impl<T> OffsetPage<T> {
    /// Wrap an already sliced window
    pub fn new(items: Vec<T>, offset: u64, limit: u64, total_count: u64) -> Self {
        Self {
            items,
            offset,
            limit,
            total_count,
        }
    }
}

impl<T> PaginationSource for OffsetPage<T> {
    fn current_page(&self) -> u64 {
        (self.offset / self.limit.max(1)).saturating_add(1)
    }

    fn per_page(&self) -> u64 {
        self.limit
    }

    fn total_entries(&self) -> u64 {
        self.total_count
    }
}
