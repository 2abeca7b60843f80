//! Campaign handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use mailcrm_core::{CampaignStats, RecipientError};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, forbidden, ApiError};
use crate::auth::{require_owner_access, require_scope, AppState, AuthContext, SCOPE_READ, SCOPE_SEND};

#[derive(Debug, Serialize)]
pub struct CampaignSendResponse {
    pub campaign_id: Uuid,
    pub message: String,
    pub recipients: usize,
    pub skipped: usize,
    pub awaiting: usize,
    pub sent_count: usize,
    pub scheduled_count: usize,
    pub completed: bool,
    pub errors: Vec<RecipientError>,
}

/// Fan a campaign out to its list or filter
///
/// POST /api/v1/owners/:owner_id/campaigns/:campaign_id/send
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, campaign_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CampaignSendResponse>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let report = state
        .fanout
        .send_campaign(owner_id, campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(CampaignSendResponse {
        campaign_id: report.campaign_id,
        message: report.message(),
        recipients: report.recipients,
        skipped: report.skipped,
        awaiting: report.awaiting,
        sent_count: report.sent_count,
        scheduled_count: report.scheduled_count,
        completed: report.completed,
        errors: report.errors,
    }))
}

/// GET /api/v1/owners/:owner_id/campaigns/:campaign_id/stats
pub async fn campaign_stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, campaign_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CampaignStats>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_READ).map_err(forbidden)?;

    let stats = state
        .fanout
        .stats(owner_id, campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(stats))
}
