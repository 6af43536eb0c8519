//! Application HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{Application, ApplicationStatus, Certificate, SubmitApplicationInput};

use crate::error::AppResult;
use crate::middleware::{require_admin, source_ip, CurrentActor};
use crate::services::{ApplicationDetails, SubmittedApplication, TransitionOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListApplicationsQuery {
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: ApplicationStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub application: Application,
    pub previous_status: ApplicationStatus,
    pub certificate: Option<Certificate>,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            application: outcome.application,
            previous_status: outcome.previous_status,
            certificate: outcome.certificate,
        }
    }
}

/// Submit an application (public)
pub async fn submit_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<SubmitApplicationInput>,
) -> AppResult<(StatusCode, Json<SubmittedApplication>)> {
    let submitted = state
        .applications
        .submit(input, source_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

/// List applications, optionally filtered by status
pub async fn list_applications(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ListApplicationsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&actor)?;
    let applications = state.applications.list(query.status).await?;
    Ok(Json(serde_json::json!({ "applications": applications })))
}

/// Get an application with its store, inspections and certificates
pub async fn get_application(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<i64>,
) -> AppResult<Json<ApplicationDetails>> {
    require_admin(&actor)?;
    Ok(Json(state.applications.get(application_id).await?))
}

/// Change an application's status
pub async fn transition_application(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<i64>,
    Json(body): Json<TransitionRequest>,
) -> AppResult<Json<TransitionResponse>> {
    require_admin(&actor)?;
    let outcome = state
        .applications
        .transition_status(application_id, body.status, body.notes, &actor)
        .await?;
    Ok(Json(outcome.into()))
}
