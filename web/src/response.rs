//! JSON response envelope.
//!
//! Every API response body is an [`ApiResponse`], tagged by its `status`
//! field:
//!
//! ```json
//! { "status": "success", "data": { ... }, "message": "Show created" }
//! { "status": "paginated", "data": [ ... ], "pagination": { "page": 1, ... } }
//! { "status": "error", "code": "NOT_FOUND", "message": "show with id ... not found" }
//! ```

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use theater_core::search::SearchResult;
use theater_core::show::ShowView;

/// Page position of a paginated response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub page_size: u32,
    /// Matches across all pages
    pub total: u64,
    /// `ceil(total / page_size)`
    pub total_pages: u64,
}

impl Pagination {
    /// Pagination for an offset/limit window.
    #[must_use]
    pub const fn from_offset(total: u64, limit: u32, offset: u32) -> Self {
        let page = if limit == 0 { 1 } else { offset / limit + 1 };
        Self {
            page,
            page_size: limit,
            total,
            total_pages: theater_core::search::total_pages(total, limit),
        }
    }
}

/// Response envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiResponse<T> {
    /// A single payload
    Success {
        /// Payload
        data: T,
        /// Optional human-readable note
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// One page of a larger result
    Paginated {
        /// Items on this page
        data: Vec<T>,
        /// Page position
        pagination: Pagination,
    },
    /// A failed request
    Error {
        /// Machine-readable code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl<T> ApiResponse<T> {
    /// Wrap a payload.
    #[must_use]
    pub const fn success(data: T) -> Self {
        Self::Success {
            data,
            message: None,
        }
    }

    /// Wrap a payload with a message.
    #[must_use]
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self::Success {
            data,
            message: Some(message.into()),
        }
    }

    /// Wrap one page of items.
    #[must_use]
    pub const fn paginated(data: Vec<T>, pagination: Pagination) -> Self {
        Self::Paginated { data, pagination }
    }

    /// An error body.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<SearchResult> for ApiResponse<ShowView> {
    fn from(result: SearchResult) -> Self {
        let pagination = Pagination {
            page: result.page,
            page_size: result.page_size,
            total: result.total,
            total_pages: result.total_pages,
        };
        Self::paginated(result.items, pagination)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
