//! Template preview handler

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, error_body, forbidden, ApiError};
use crate::auth::{require_owner_access, require_scope, AppState, AuthContext, SCOPE_READ};

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub contact_id: Uuid,
    pub template_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub subject: String,
    pub body: String,
    pub html: String,
    pub unresolved: Vec<String>,
}

/// Resolve content for one contact without sending
///
/// POST /api/v1/owners/:owner_id/templates/preview
pub async fn preview_template(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(owner_id): Path<Uuid>,
    Json(input): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_READ).map_err(forbidden)?;

    let contact = state
        .store
        .contacts
        .get_by_owner(owner_id, input.contact_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "not_found", "Contact not found"))?;

    let content = state
        .engine
        .resolve_content(owner_id, input.template_id, input.subject, input.body)
        .await
        .map_err(api_error)?;

    let processor = state.engine.processor();
    let resolved = processor.resolve_message(&content.subject, &content.body, &contact, Utc::now());
    let html = processor.to_display_html(&resolved.body).map_err(api_error)?;

    let mut unresolved = processor.unresolved_placeholders(&resolved.subject);
    for token in processor.unresolved_placeholders(&resolved.body) {
        if !unresolved.contains(&token) {
            unresolved.push(token);
        }
    }

    Ok(Json(PreviewResponse {
        subject: resolved.subject,
        body: resolved.body,
        html,
        unresolved,
    }))
}
