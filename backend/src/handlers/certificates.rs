//! Certificate HTTP handlers
//!
//! Verification and search are public; everything else needs a staff token.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::Certificate;

use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, CurrentActor};
use crate::services::CertificateView;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

/// Public verification result
#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    #[serde(flatten)]
    pub view: CertificateView,
    pub qr_code_url: String,
}

fn with_qr(state: &AppState, view: CertificateView) -> AppResult<VerificationResponse> {
    let qr_code_url = state.qr.render(&view.certificate.verification_url)?;
    Ok(VerificationResponse { view, qr_code_url })
}

// ============================================================================
// Public endpoints
// ============================================================================

/// Verify a certificate by its number
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> AppResult<Json<VerificationResponse>> {
    let view = state.certificates.get_by_number(&number, Utc::now()).await?;
    Ok(Json(with_qr(&state, view)?))
}

/// Look a certificate up by number or store name/address
pub async fn search_certificates(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<VerificationResponse>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(AppError::validation("q", "Search query is required"));
    }

    let view = state
        .certificates
        .search(q, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;
    Ok(Json(with_qr(&state, view)?))
}

// ============================================================================
// Staff endpoints
// ============================================================================

/// Get a certificate by id
pub async fn get_certificate(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(certificate_id): Path<i64>,
) -> AppResult<Json<CertificateView>> {
    Ok(Json(state.certificates.get(certificate_id, Utc::now()).await?))
}

/// Certificates issued for an application
pub async fn application_certificates(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&actor)?;
    let certificates = state
        .certificates
        .list_for_application(application_id)
        .await?;
    Ok(Json(serde_json::json!({ "certificates": certificates })))
}

/// Revoke a certificate
pub async fn revoke_certificate(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(certificate_id): Path<i64>,
    Json(body): Json<RevokeRequest>,
) -> AppResult<Json<Certificate>> {
    require_admin(&actor)?;
    let certificate = state
        .certificates
        .revoke(certificate_id, &body.reason, &actor)
        .await?;
    Ok(Json(certificate))
}

/// Mark every lapsed certificate as expired
pub async fn expire_certificates(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&actor)?;
    let expired = state
        .certificates
        .expire_sweep(Some(&actor), Utc::now())
        .await?;
    Ok(Json(serde_json::json!({
        "expired": expired.len(),
        "certificates": expired,
    })))
}
