//! Explicit pagination context shared by the records of one session.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Rows per page when nothing else is configured.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Pagination settings and the last computed page count.
///
/// One context is owned by a [`crate::Session`]; give each request its own
/// session (or context) so concurrent requests never observe each other's
/// page counts.
#[derive(Debug)]
pub struct OrmContext {
    page_limit: AtomicUsize,
    total_pages: AtomicUsize,
}

impl Default for OrmContext {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

impl OrmContext {
    /// Create a context with the given page size (clamped to at least 1).
    pub fn new(page_limit: usize) -> Self {
        Self {
            page_limit: AtomicUsize::new(page_limit.max(1)),
            total_pages: AtomicUsize::new(0),
        }
    }

    /// Rows per page used by `paginate`.
    pub fn page_limit(&self) -> usize {
        self.page_limit.load(Ordering::Relaxed)
    }

    pub fn set_page_limit(&self, limit: usize) {
        self.page_limit.store(limit.max(1), Ordering::Relaxed);
    }

    /// Page count computed by the most recent `paginate` call.
    pub fn total_pages(&self) -> usize {
        self.total_pages.load(Ordering::Relaxed)
    }

    pub(crate) fn record_total_pages(&self, pages: usize) {
        self.total_pages.store(pages, Ordering::Relaxed);
    }
}
