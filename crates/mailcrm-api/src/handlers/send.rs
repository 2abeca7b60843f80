//! Send handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mailcrm_core::{BulkSendReport, BulkSendRequest, RecipientError, SendRequest};
use mailcrm_storage::DeliveryRecord;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{api_error, error_body, forbidden, ApiError};
use crate::auth::{require_owner_access, require_scope, AppState, AuthContext, SCOPE_READ, SCOPE_SEND};

/// Delivery record response
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub template_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub status_detail: Option<String>,
    pub tracking_id: Option<String>,
    pub provider_message_id: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<DeliveryRecord> for DeliveryResponse {
    fn from(r: DeliveryRecord) -> Self {
        Self {
            id: r.id,
            contact_id: r.contact_id,
            template_id: r.template_id,
            campaign_id: r.campaign_id,
            from_address: r.from_address,
            to_address: r.to_address,
            subject: r.subject,
            body: r.body,
            status: r.status,
            status_detail: r.status_detail,
            tracking_id: r.tracking_id,
            provider_message_id: r.provider_message_id,
            scheduled_time: r.scheduled_time,
            sent_at: r.sent_at,
            opened: r.opened,
            opened_at: r.opened_at,
            open_count: r.open_count,
            clicked: r.clicked,
            clicked_at: r.clicked_at,
            click_count: r.click_count,
            created_at: r.created_at,
        }
    }
}

/// Partial-success summary of a bulk send
#[derive(Debug, Serialize)]
pub struct BulkSendResponse {
    pub status: String,
    pub message: String,
    pub sent_count: usize,
    pub scheduled_count: usize,
    pub errors: Vec<RecipientError>,
}

impl From<BulkSendReport> for BulkSendResponse {
    fn from(report: BulkSendReport) -> Self {
        Self {
            status: "success".to_string(),
            message: report.message(),
            sent_count: report.sent_count,
            scheduled_count: report.scheduled_count,
            errors: report.errors,
        }
    }
}

/// Send one email to a contact
///
/// POST /api/v1/owners/:owner_id/contacts/:contact_id/send
pub async fn send_to_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, contact_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<SendRequest>,
) -> Result<(StatusCode, Json<DeliveryResponse>), ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let record = state
        .engine
        .send_to_contact(owner_id, contact_id, input)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(DeliveryResponse::from(record))))
}

/// Send a template to many contacts, now or at `scheduled_time`
///
/// POST /api/v1/owners/:owner_id/send/bulk
pub async fn send_bulk(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(owner_id): Path<Uuid>,
    Json(input): Json<BulkSendRequest>,
) -> Result<Json<BulkSendResponse>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let report = state
        .engine
        .send_bulk(owner_id, input)
        .await
        .map_err(api_error)?;

    info!(
        "Bulk send for owner {}: {} sent, {} scheduled, {} failed",
        owner_id,
        report.sent_count,
        report.scheduled_count,
        report.errors.len()
    );
    Ok(Json(BulkSendResponse::from(report)))
}

/// Get one delivery record
///
/// GET /api/v1/owners/:owner_id/deliveries/:delivery_id
pub async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_READ).map_err(forbidden)?;

    let record = state
        .store
        .deliveries
        .get_by_owner(owner_id, delivery_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "not_found", "Delivery not found"))?;

    Ok(Json(DeliveryResponse::from(record)))
}
