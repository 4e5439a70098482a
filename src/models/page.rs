use serde::Serialize;

use crate::query::PageRequest;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: u64,
    pub page_size: u64,
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageMeta {
    pub fn new(request: &PageRequest, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(request.page_size);
        Self {
            current_page: request.page,
            page_size: request.page_size,
            total_count,
            total_pages,
            has_next: request.page < total_pages,
            has_previous: request.page > 1,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: PageMeta,
}
