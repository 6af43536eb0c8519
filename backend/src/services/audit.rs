//! Audit trail recording and history export

use std::sync::Arc;

use serde_json::Value;
use shared::{Actor, AuditAction, AuditLogEntry, EntityType, NewAuditEntry};

use crate::error::{AppError, AppResult};
use crate::repository::Repository;

/// Build an audit entry for an action taken by `actor` (None for public or
/// system actions)
pub fn audit_entry(
    actor: Option<&Actor>,
    action: AuditAction,
    entity_type: EntityType,
    entity_id: i64,
    details: Value,
) -> NewAuditEntry {
    NewAuditEntry {
        actor_id: actor.map(|a| a.user_id),
        action,
        entity_type,
        entity_id,
        details,
        ip_address: actor.and_then(|a| a.source_ip.clone()),
    }
}

/// Appends audit entries outside the transaction of the change they describe
#[derive(Clone)]
pub struct AuditRecorder {
    repo: Arc<dyn Repository>,
}

impl AuditRecorder {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Best effort: a failed write is logged and swallowed
    pub async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action;
        let entity_type = entry.entity_type;
        let entity_id = entry.entity_id;
        if let Err(e) = self.repo.append_audit(entry).await {
            tracing::warn!(
                error = %e,
                action = %action,
                entity_type = %entity_type,
                entity_id,
                "Failed to write audit entry"
            );
        }
    }

    /// Entries for one entity, oldest first
    pub async fn history(
        &self,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.repo.audit_history(entity_type, entity_id).await
    }

    /// History as CSV with a header row
    pub async fn export_csv(&self, entity_type: EntityType, entity_id: i64) -> AppResult<String> {
        let entries = self.history(entity_type, entity_id).await?;
        history_to_csv(&entries)
    }
}

pub fn history_to_csv(entries: &[AuditLogEntry]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| AppError::Internal(format!("CSV encoding failed: {}", e));

    writer
        .write_record([
            "id",
            "created_at",
            "actor_id",
            "action",
            "entity_type",
            "entity_id",
            "ip_address",
            "details",
        ])
        .map_err(csv_error)?;

    for entry in entries {
        writer
            .write_record([
                entry.id.to_string(),
                entry.created_at.to_rfc3339(),
                entry.actor_id.map(|id| id.to_string()).unwrap_or_default(),
                entry.action.as_str().to_string(),
                entry.entity_type.as_str().to_string(),
                entry.entity_id.to_string(),
                entry.ip_address.clone().unwrap_or_default(),
                entry.details.to_string(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV encoding failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV encoding failed: {}", e)))
}
