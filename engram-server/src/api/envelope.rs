//! The uniform JSON envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use engram_core::errors::EngramError;

/// `{success, data?, error?}` with the HTTP status it rides on.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    /// A handled request-level failure (validation, not-found): the
    /// envelope reports it without a 5xx status.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status: StatusCode::OK,
        }
    }

    /// An internal failure. Error text is the enum rendering, never a
    /// stack trace.
    pub fn internal(error: &EngramError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse an engine result into the envelope.
    pub fn from_result(result: Result<T, EngramError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::internal(&e),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
