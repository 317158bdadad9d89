//! Page windows and paginated results.

use serde::Serialize;

/// Offset/limit window applied to a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRow {
    pub offset: u64,
    pub limit: u64,
}

impl PageRow {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// One page of records plus the totals it was cut from.
///
/// The requested page number is clamped into `[1, total_pages]`, so a page
/// past the end yields the last page rather than an empty one.
#[derive(Debug, Clone, Serialize)]
pub struct Paginator<T> {
    total: u64,
    page_number: u64,
    page_size: u64,
    total_pages: u64,
    list: Vec<T>,
}

impl<T> Paginator<T> {
    /// `page_size` must be non-zero; the record layer rejects zero before
    /// getting here.
    pub fn new(total: u64, page_number: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(page_size)
        };
        let page_number = page_number.clamp(1, total_pages.max(1));
        Self {
            total,
            page_number,
            page_size,
            total_pages,
            list: Vec::new(),
        }
    }

    pub fn with_list(mut self, list: Vec<T>) -> Self {
        self.list = list;
        self
    }

    /// Window for the current page.
    pub fn page_row(&self) -> PageRow {
        PageRow::new((self.page_number - 1) * self.page_size, self.page_size)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn list(&self) -> &[T] {
        &self.list
    }

    pub fn into_list(self) -> Vec<T> {
        self.list
    }

    pub fn is_first_page(&self) -> bool {
        self.page_number == 1
    }

    pub fn is_last_page(&self) -> bool {
        self.page_number >= self.total_pages
    }

    pub fn has_prev_page(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page_number < self.total_pages
    }

    pub fn prev_page(&self) -> u64 {
        if self.has_prev_page() {
            self.page_number - 1
        } else {
            1
        }
    }

    pub fn next_page(&self) -> u64 {
        if self.has_next_page() {
            self.page_number + 1
        } else {
            self.page_number
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_page_of_twenty_five() {
        let pager: Paginator<()> = Paginator::new(25, 2, 10);
        assert_eq!(pager.total_pages(), 3);
        assert_eq!(pager.page_row(), PageRow::new(10, 10));
        assert!(pager.has_prev_page());
        assert!(pager.has_next_page());
        assert_eq!(pager.next_page(), 3);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let pager: Paginator<()> = Paginator::new(25, 9, 10);
        assert_eq!(pager.page_number(), 3);
        assert_eq!(pager.page_row().offset, 20);
        assert!(pager.is_last_page());
    }

    #[test]
    fn empty_result_stays_on_first_page() {
        let pager: Paginator<()> = Paginator::new(0, 4, 10);
        assert_eq!(pager.total_pages(), 0);
        assert_eq!(pager.page_number(), 1);
        assert_eq!(pager.page_row(), PageRow::new(0, 10));
        assert!(pager.is_first_page());
        assert!(!pager.has_next_page());
    }

    #[test]
    fn exact_multiple_has_no_partial_page() {
        let pager: Paginator<()> = Paginator::new(30, 1, 10);
        assert_eq!(pager.total_pages(), 3);
        assert_eq!(pager.prev_page(), 1);
    }
}
