//! API request handlers

pub mod analytics;
pub mod campaigns;
pub mod drafts;
pub mod health;
pub mod send;
pub mod templates;
pub mod webhooks;

pub use health::*;

use axum::{http::StatusCode, Json};
use mailcrm_common::Error;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Persisted record of a failed delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<Uuid>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error_body(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
            delivery_id: None,
        }),
    )
}

/// Map a service error to its HTTP response
pub(crate) fn api_error(e: Error) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = e.code().to_ascii_lowercase();

    match e {
        Error::Delivery {
            delivery_id,
            reason,
        } => (
            status,
            Json(ErrorResponse {
                error: code,
                message: reason,
                delivery_id: Some(delivery_id),
            }),
        ),
        Error::Database(_) | Error::Internal(_) | Error::Config(_) | Error::Other(_) => {
            error!("Internal error: {}", e);
            error_body(status, &code, "Internal server error")
        }
        other => error_body(status, &code, other.to_string()),
    }
}

/// Map an auth-helper status to its HTTP response
pub(crate) fn forbidden(status: StatusCode) -> ApiError {
    error_body(status, "forbidden", "Not authorized for this owner")
}
