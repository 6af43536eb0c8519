//! Inspection HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{EvidencePhoto, GeoPoint, Inspection};

use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, CurrentActor};
use crate::services::{
    AttachPhotoInput, CompleteInspectionInput, CompletedInspection, InspectionDetails,
    ScheduleInspectionInput,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartInspectionRequest {
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Deserialize)]
pub struct CancelInspectionRequest {
    pub reason: String,
}

/// Schedule an inspection for an application (admin, or an inspector for
/// their own visit)
pub async fn schedule_inspection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(input): Json<ScheduleInspectionInput>,
) -> AppResult<(StatusCode, Json<Inspection>)> {
    let inspection = state.inspections.schedule(input, &actor).await?;
    Ok((StatusCode::CREATED, Json(inspection)))
}

/// Inspections assigned to the caller
pub async fn my_inspections(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> AppResult<Json<serde_json::Value>> {
    let inspections = state.inspections.list_for_inspector(actor.user_id).await?;
    Ok(Json(serde_json::json!({ "inspections": inspections })))
}

/// Inspections for one application
pub async fn application_inspections(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&actor)?;
    let inspections = state.inspections.list_for_application(application_id).await?;
    Ok(Json(serde_json::json!({ "inspections": inspections })))
}

/// Get an inspection with its evidence photos
pub async fn get_inspection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(inspection_id): Path<i64>,
) -> AppResult<Json<InspectionDetails>> {
    let details = state.inspections.get(inspection_id).await?;
    if !actor.is_admin() && !details.inspection.is_assigned_to(actor.user_id) {
        return Err(AppError::Forbidden(
            "Inspection is assigned to another inspector".to_string(),
        ));
    }
    Ok(Json(details))
}

/// Begin a visit
pub async fn start_inspection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(inspection_id): Path<i64>,
    body: Option<Json<StartInspectionRequest>>,
) -> AppResult<Json<Inspection>> {
    let location = body.and_then(|Json(body)| body.location);
    let inspection = state
        .inspections
        .start(inspection_id, &actor, location)
        .await?;
    Ok(Json(inspection))
}

/// Attach an uploaded photo as evidence
pub async fn attach_photo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(inspection_id): Path<i64>,
    Json(input): Json<AttachPhotoInput>,
) -> AppResult<(StatusCode, Json<EvidencePhoto>)> {
    let photo = state
        .inspections
        .attach_photo(inspection_id, input, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

/// Record the verdict of a visit
pub async fn complete_inspection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(inspection_id): Path<i64>,
    Json(input): Json<CompleteInspectionInput>,
) -> AppResult<Json<CompletedInspection>> {
    let completed = state
        .inspections
        .complete(inspection_id, input, &actor)
        .await?;
    Ok(Json(completed))
}

/// Cancel an open inspection
pub async fn cancel_inspection(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(inspection_id): Path<i64>,
    Json(body): Json<CancelInspectionRequest>,
) -> AppResult<Json<Inspection>> {
    let inspection = state
        .inspections
        .cancel(inspection_id, &body.reason, &actor)
        .await?;
    Ok(Json(inspection))
}
