//! Response envelope and pagination types shared by every endpoint.

use serde::{Deserialize, Serialize};

/// Default page size when `limit` is not given.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest page a client may request.
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Success envelope returned by all JSON endpoints.
///
/// ```json
/// {
///   "status": "success",
///   "data": { ... },
///   "message": "Payment recorded",
///   "pagination": { "total": 120, "limit": 50, "offset": 0, "has_more": true }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageMeta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: "success",
            data,
            message: None,
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: PageMeta) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// `limit`/`offset` query parameters accepted by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    /// Page size clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// Non-negative row offset.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let limit = self.limit();
        let offset = self.offset();
        PageMeta {
            total,
            limit,
            offset,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}
