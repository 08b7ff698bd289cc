pub mod admin;
pub mod applications;
pub mod auth;
pub mod disputes;
pub mod meta;
pub mod payments;
pub mod projects;
pub mod team;

use serde::{Deserialize, Serialize};

/// Stateless 1-based pagination; reads are independently retryable.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        let limit = pagination.limit();
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            items,
            total,
            page: pagination.page(),
            total_pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_bounds() {
        let p = Pagination { page: None, limit: None };
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);

        let p = Pagination { page: Some(0), limit: Some(500) };
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 100);

        let p = Pagination { page: Some(3), limit: Some(10) };
        assert_eq!(p.offset(), 20);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination { page: Some(1), limit: Some(20) };
        assert_eq!(Paginated::new(vec![0u8; 20], 41, &p).total_pages, 3);
        assert_eq!(Paginated::new(vec![0u8; 20], 40, &p).total_pages, 2);
        assert_eq!(Paginated::<u8>::new(vec![], 0, &p).total_pages, 0);
    }
}
