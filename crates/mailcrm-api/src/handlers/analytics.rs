//! Analytics handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use mailcrm_core::AnalyticsSummary;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, forbidden, ApiError};
use crate::auth::{require_owner_access, require_scope, AppState, AuthContext, SCOPE_READ};

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "csv".to_string()
}

/// GET /api/v1/owners/:owner_id/analytics
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_READ).map_err(forbidden)?;

    let summary = state.analytics.summary(owner_id).await.map_err(api_error)?;
    Ok(Json(summary))
}

/// GET /api/v1/owners/:owner_id/analytics/export?format=csv|json
pub async fn export(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(owner_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_owner_access(&auth, owner_id).map_err(forbidden)?;
    require_scope(&auth, SCOPE_READ).map_err(forbidden)?;

    let file = state
        .analytics
        .export(owner_id, &query.format)
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.body,
    ))
}
