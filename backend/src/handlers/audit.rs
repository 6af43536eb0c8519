//! Audit log HTTP handlers

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use shared::{AuditLogEntry, EntityType};

use crate::error::AppResult;
use crate::middleware::{require_admin, CurrentActor};
use crate::AppState;

/// History of one entity, oldest first
pub async fn entity_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((entity_type, entity_id)): Path<(EntityType, i64)>,
) -> AppResult<Json<Vec<AuditLogEntry>>> {
    require_admin(&actor)?;
    Ok(Json(state.audit.history(entity_type, entity_id).await?))
}

/// History of one entity as a CSV download
pub async fn export_history(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((entity_type, entity_id)): Path<(EntityType, i64)>,
) -> AppResult<impl IntoResponse> {
    require_admin(&actor)?;
    let csv = state.audit.export_csv(entity_type, entity_id).await?;
    let disposition = format!(
        "attachment; filename=\"audit-{}-{}.csv\"",
        entity_type, entity_id
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
