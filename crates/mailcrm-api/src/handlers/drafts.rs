//! Send draft handlers
//!
//! A draft stages a bulk send so the caller can review every recipient's
//! resolved content before anything is delivered.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use mailcrm_core::{CreateDraftRequest, DraftPreview};
use std::sync::Arc;
use uuid::Uuid;

use super::send::BulkSendResponse;
use super::{api_error, forbidden, ApiError};
use crate::auth::{require_owner_access, require_scope, AppState, AuthContext, SCOPE_SEND};

/// POST /api/v1/owners/:owner_id/drafts
pub async fn create_draft(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(owner_id): Path<Uuid>,
    Json(input): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<DraftPreview>), ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let now = Utc::now();
    let draft = state
        .drafts
        .create(owner_id, input, now)
        .await
        .map_err(api_error)?;
    let preview = state
        .drafts
        .preview(owner_id, draft.id, now)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(preview)))
}

/// GET /api/v1/owners/:owner_id/drafts/:draft_id
pub async fn preview_draft(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, draft_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DraftPreview>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let preview = state
        .drafts
        .preview(owner_id, draft_id, Utc::now())
        .await
        .map_err(api_error)?;

    Ok(Json(preview))
}

/// POST /api/v1/owners/:owner_id/drafts/:draft_id/confirm
pub async fn confirm_draft(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, draft_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BulkSendResponse>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    let report = state
        .drafts
        .confirm(owner_id, draft_id, Utc::now())
        .await
        .map_err(api_error)?;

    Ok(Json(BulkSendResponse::from(report)))
}

/// DELETE /api/v1/owners/:owner_id/drafts/:draft_id
pub async fn discard_draft(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((owner_id, draft_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_SEND).map_err(forbidden)?;

    state
        .drafts
        .discard(owner_id, draft_id)
        .await
        .map_err(api_error)?;

    Ok(StatusCode::NO_CONTENT)
}
