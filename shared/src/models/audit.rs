//! Audit trail models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::models::application::ApplicationStatus;
use crate::types::EntityType;

/// Actions recorded in the audit log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ApplicationSubmitted,
    ApplicationUnderReview,
    ApplicationApproved,
    ApplicationRejected,
    InspectionCreated,
    InspectionStarted,
    InspectionPhotoAdded,
    InspectionCompleted,
    InspectionCancelled,
    CertificateIssued,
    CertificateRevoked,
    CertificateExpired,
}

impl AuditAction {
    pub const ALL: [AuditAction; 12] = [
        AuditAction::ApplicationSubmitted,
        AuditAction::ApplicationUnderReview,
        AuditAction::ApplicationApproved,
        AuditAction::ApplicationRejected,
        AuditAction::InspectionCreated,
        AuditAction::InspectionStarted,
        AuditAction::InspectionPhotoAdded,
        AuditAction::InspectionCompleted,
        AuditAction::InspectionCancelled,
        AuditAction::CertificateIssued,
        AuditAction::CertificateRevoked,
        AuditAction::CertificateExpired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ApplicationSubmitted => "APPLICATION_SUBMITTED",
            AuditAction::ApplicationUnderReview => "APPLICATION_UNDER_REVIEW",
            AuditAction::ApplicationApproved => "APPLICATION_APPROVED",
            AuditAction::ApplicationRejected => "APPLICATION_REJECTED",
            AuditAction::InspectionCreated => "INSPECTION_CREATED",
            AuditAction::InspectionStarted => "INSPECTION_STARTED",
            AuditAction::InspectionPhotoAdded => "INSPECTION_PHOTO_ADDED",
            AuditAction::InspectionCompleted => "INSPECTION_COMPLETED",
            AuditAction::InspectionCancelled => "INSPECTION_CANCELLED",
            AuditAction::CertificateIssued => "CERTIFICATE_ISSUED",
            AuditAction::CertificateRevoked => "CERTIFICATE_REVOKED",
            AuditAction::CertificateExpired => "CERTIFICATE_EXPIRED",
        }
    }

    /// `APPLICATION_<STATUS>` for a status change
    pub fn for_application_status(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::Pending => AuditAction::ApplicationSubmitted,
            ApplicationStatus::UnderReview => AuditAction::ApplicationUnderReview,
            ApplicationStatus::Approved => AuditAction::ApplicationApproved,
            ApplicationStatus::Rejected => AuditAction::ApplicationRejected,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::invalid("action", format!("unknown audit action '{}'", s)))
    }
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    /// None for public or system actions
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit record before it is assigned an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings_round_trip() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
            assert!(action
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_serde_matches_tag() {
        let json = serde_json::to_string(&AuditAction::InspectionCompleted).unwrap();
        assert_eq!(json, "\"INSPECTION_COMPLETED\"");
    }

    #[test]
    fn test_status_actions() {
        assert_eq!(
            AuditAction::for_application_status(ApplicationStatus::UnderReview).as_str(),
            "APPLICATION_UNDER_REVIEW"
        );
        assert_eq!(
            AuditAction::for_application_status(ApplicationStatus::Approved).as_str(),
            "APPLICATION_APPROVED"
        );
    }
}
