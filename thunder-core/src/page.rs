use serde::{Deserialize, Serialize};

/// Pagination parameters, deserializable from query params.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pageable {
    pub page: u64,
    pub size: u64,
}

impl Default for Pageable {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

impl Pageable {
    pub fn offset(&self) -> u64 {
        self.page * self.size
    }

    /// Clamp the page size to the configured maximum (and at least 1).
    pub fn clamped(mut self, max_size: u64) -> Self {
        self.size = self.size.clamp(1, max_size.max(1));
        self
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let total_pages = if pageable.size == 0 {
            0
        } else {
            total_elements.div_ceil(pageable.size)
        };
        Self {
            content,
            page: pageable.page,
            size: pageable.size,
            total_elements,
            total_pages,
        }
    }
}
