use serde::{Deserialize, Serialize};

use super::ConfigurationError;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    page_size: usize,
    current_page: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            current_page: 1,
        }
    }
}

impl PaginationState {
    pub fn new(page_size: usize, current_page: usize) -> Result<Self, ConfigurationError> {
        if page_size == 0 {
            return Err(ConfigurationError::InvalidPageSize);
        }
        Ok(Self {
            page_size,
            current_page: current_page.max(1),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), ConfigurationError> {
        if page_size == 0 {
            return Err(ConfigurationError::InvalidPageSize);
        }
        self.page_size = page_size;
        Ok(())
    }
}

/// Resolved slice bounds for one page. `clamped_page` is always within
/// `1..=total_pages`; callers are expected to store it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub filtered_count: usize,
    pub total_pages: usize,
    pub clamped_page: usize,
    pub start: usize,
    pub end: usize,
}

impl PageWindow {
    pub fn slice<'s, T>(&self, items: &'s [T]) -> &'s [T] {
        let end = self.end.min(items.len());
        let start = self.start.min(end);
        &items[start..end]
    }
}

pub fn total_pages(filtered_count: usize, page_size: usize) -> usize {
    filtered_count.div_ceil(page_size.max(1)).max(1)
}

pub fn window(filtered_count: usize, page_size: usize, requested_page: usize) -> PageWindow {
    let page_size = page_size.max(1);
    let total_pages = total_pages(filtered_count, page_size);
    let clamped_page = requested_page.clamp(1, total_pages);
    let start = ((clamped_page - 1) * page_size).min(filtered_count);
    let end = (start + page_size).min(filtered_count);
    PageWindow {
        filtered_count,
        total_pages,
        clamped_page,
        start,
        end,
    }
}

/// Page metadata reported by a server-paginated feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPage {
    pub total_records: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
}

impl ServerPage {
    /// The server already sliced; every received item stays on the page.
    pub fn window(&self, received: usize) -> PageWindow {
        let total_pages = self.total_pages.max(1);
        PageWindow {
            filtered_count: received,
            total_pages,
            clamped_page: self.current_page.clamp(1, total_pages),
            start: 0,
            end: received,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaginationMode {
    #[default]
    Local,
    Server(ServerPage),
}
