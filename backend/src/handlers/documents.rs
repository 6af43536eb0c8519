//! Document upload and download handlers

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::documents::{DocumentMetadata, NewDocument};
use crate::middleware::CurrentActor;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub filename: String,
    pub content_type: String,
    /// Base64-encoded file content
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadDocumentResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

/// Upload a supporting document or photo
pub async fn upload_document(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<UploadDocumentRequest>,
) -> AppResult<(StatusCode, Json<UploadDocumentResponse>)> {
    if body.filename.trim().is_empty() {
        return Err(AppError::validation("filename", "Filename is required"));
    }
    let content = STANDARD
        .decode(body.content.as_bytes())
        .map_err(|_| AppError::validation("content", "Content must be base64"))?;

    let (id, metadata) = state
        .documents
        .store(NewDocument {
            filename: body.filename.trim().to_string(),
            content_type: body.content_type,
            content,
        })
        .await?;

    tracing::info!(
        document_id = %id,
        size = metadata.size_bytes,
        uploaded_by = actor.user_id,
        "Document stored"
    );
    Ok((StatusCode::CREATED, Json(UploadDocumentResponse { id, metadata })))
}

/// Download a stored document
pub async fn download_document(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(document_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let document = state.documents.retrieve(document_id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.metadata.filename.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, document.metadata.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.content,
    ))
}
