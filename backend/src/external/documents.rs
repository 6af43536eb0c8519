//! Document and evidence storage
//!
//! Files are addressed by opaque UUIDs. [`FsDocumentStore`] keeps the bytes
//! at `{root}/{id}` and a JSON sidecar at `{root}/{id}.json`.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Descriptive data kept alongside a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content
    pub checksum_sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A file ready to be stored
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A stored file
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: Uuid,
    pub metadata: DocumentMetadata,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a file and return its id and metadata
    async fn store(&self, document: NewDocument) -> AppResult<(Uuid, DocumentMetadata)>;

    async fn retrieve(&self, id: Uuid) -> AppResult<StoredDocument>;
}

pub fn sha256_hex(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Local filesystem storage
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
    max_bytes: usize,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    fn content_path(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn metadata_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

fn io_error(action: &str, err: std::io::Error) -> AppError {
    AppError::Internal(format!("Failed to {} document: {}", action, err))
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn store(&self, document: NewDocument) -> AppResult<(Uuid, DocumentMetadata)> {
        if document.content.is_empty() {
            return Err(AppError::validation("content", "Document is empty"));
        }
        if document.content.len() > self.max_bytes {
            return Err(AppError::validation(
                "content",
                format!("Document exceeds the {} byte limit", self.max_bytes),
            ));
        }
        let filename = document.filename.trim();
        if filename.is_empty() {
            return Err(AppError::validation("filename", "Filename is required"));
        }

        let id = Uuid::new_v4();
        let metadata = DocumentMetadata {
            filename: filename.to_string(),
            content_type: document.content_type,
            size_bytes: document.content.len() as u64,
            checksum_sha256: sha256_hex(&document.content),
            uploaded_at: Utc::now(),
        };
        let sidecar = serde_json::to_vec(&metadata)
            .map_err(|e| AppError::Internal(format!("Failed to encode metadata: {}", e)))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error("prepare storage for", e))?;
        tokio::fs::write(self.content_path(id), &document.content)
            .await
            .map_err(|e| io_error("write", e))?;
        tokio::fs::write(self.metadata_path(id), sidecar)
            .await
            .map_err(|e| io_error("write metadata for", e))?;

        tracing::debug!(document_id = %id, size = metadata.size_bytes, "Document stored");
        Ok((id, metadata))
    }

    async fn retrieve(&self, id: Uuid) -> AppResult<StoredDocument> {
        let sidecar = match tokio::fs::read(self.metadata_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("Document".to_string()))
            }
            Err(e) => return Err(io_error("read metadata for", e)),
        };
        let metadata: DocumentMetadata = serde_json::from_slice(&sidecar)
            .map_err(|e| AppError::Internal(format!("Corrupt document metadata: {}", e)))?;
        let content = tokio::fs::read(self.content_path(id))
            .await
            .map_err(|e| io_error("read", e))?;

        if sha256_hex(&content) != metadata.checksum_sha256 {
            return Err(AppError::Internal(format!(
                "Checksum mismatch for document {}",
                id
            )));
        }

        Ok(StoredDocument {
            id,
            metadata,
            content,
        })
    }
}
