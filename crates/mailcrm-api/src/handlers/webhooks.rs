//! Provider webhook handler

use axum::{extract::State, http::StatusCode, Form};
use chrono::Utc;
use mailcrm_common::Error;
use mailcrm_core::WebhookPayload;
use std::sync::Arc;
use tracing::error;

use crate::auth::AppState;

/// Mailgun event callback
///
/// POST /webhooks/mailgun
///
/// Events for unknown deliveries are acknowledged so the provider stops
/// retrying them.
pub async fn mailgun(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<WebhookPayload>,
) -> (StatusCode, &'static str) {
    match state.webhooks.handle(&payload, Utc::now()).await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(Error::Auth(_)) => (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => {
            error!("Failed to process webhook: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error")
        }
    }
}
