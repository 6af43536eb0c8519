//! Site inspection models and the inspection state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::types::GeoPoint;
use crate::validation::require_text;

/// Status of a site inspection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Scheduled => "scheduled",
            InspectionStatus::InProgress => "in_progress",
            InspectionStatus::Completed => "completed",
            InspectionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, InspectionStatus::Scheduled | InspectionStatus::InProgress)
    }
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InspectionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(InspectionStatus::Scheduled),
            "in_progress" => Ok(InspectionStatus::InProgress),
            "completed" => Ok(InspectionStatus::Completed),
            "cancelled" => Ok(InspectionStatus::Cancelled),
            other => Err(DomainError::invalid(
                "status",
                format!("unknown inspection status '{}'", other),
            )),
        }
    }
}

/// Inspector's verdict, recorded only on completion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(DomainError::invalid(
                "decision",
                format!("decision must be approved or rejected, got '{}'", other),
            )),
        }
    }
}

/// A site visit for one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: i64,
    pub application_id: i64,
    pub inspector_id: i64,
    pub status: InspectionStatus,
    pub visit_date: Option<DateTime<Utc>>,
    /// Location snapshot taken when the visit started
    pub location: Option<GeoPoint>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub decision: Option<Decision>,
    /// Opaque signature payload (e.g. a data URI from a signature pad)
    pub signature: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for scheduling an inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInspection {
    pub application_id: i64,
    pub inspector_id: i64,
    pub visit_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

fn transition_error(from: InspectionStatus, to: InspectionStatus) -> DomainError {
    DomainError::Transition {
        entity: "inspection",
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

impl Inspection {
    pub fn is_assigned_to(&self, inspector_id: i64) -> bool {
        self.inspector_id == inspector_id
    }

    /// scheduled -> in_progress
    pub fn start(&mut self, now: DateTime<Utc>, location: Option<GeoPoint>) -> Result<(), DomainError> {
        if self.status != InspectionStatus::Scheduled {
            return Err(transition_error(self.status, InspectionStatus::InProgress));
        }
        if let Some(point) = &location {
            if !point.is_plausible() {
                return Err(DomainError::invalid("location", "Coordinates are out of range"));
            }
        }
        self.status = InspectionStatus::InProgress;
        self.started_at = Some(now);
        self.location = location;
        self.updated_at = now;
        Ok(())
    }

    /// in_progress -> completed; decision and end time are set together
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        decision: Decision,
        notes: &str,
        signature: Option<String>,
    ) -> Result<(), DomainError> {
        require_text("notes", notes)?;
        if self.status != InspectionStatus::InProgress || self.started_at.is_none() {
            return Err(transition_error(self.status, InspectionStatus::Completed));
        }
        let signature = signature.filter(|s| !s.trim().is_empty());

        self.status = InspectionStatus::Completed;
        self.completed_at = Some(now);
        self.decision = Some(decision);
        self.notes = Some(notes.trim().to_string());
        self.signed_at = signature.as_ref().map(|_| now);
        self.signature = signature;
        self.updated_at = now;
        Ok(())
    }

    /// scheduled | in_progress -> cancelled
    ///
    /// The reason is required but not stored on the inspection; scheduling
    /// notes are kept and the reason belongs in the audit trail.
    pub fn cancel(&mut self, now: DateTime<Utc>, reason: &str) -> Result<(), DomainError> {
        require_text("reason", reason)?;
        if !self.status.is_open() {
            return Err(transition_error(self.status, InspectionStatus::Cancelled));
        }
        self.status = InspectionStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Evidence may be added at any point except after cancellation
    pub fn accepts_evidence(&self) -> bool {
        self.status != InspectionStatus::Cancelled
    }
}

/// Subject of an evidence photo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhotoType {
    Exterior,
    Kitchen,
    Storage,
    Ingredients,
    Certificate,
    Other,
}

impl PhotoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoType::Exterior => "exterior",
            PhotoType::Kitchen => "kitchen",
            PhotoType::Storage => "storage",
            PhotoType::Ingredients => "ingredients",
            PhotoType::Certificate => "certificate",
            PhotoType::Other => "other",
        }
    }
}

impl std::str::FromStr for PhotoType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exterior" => Ok(PhotoType::Exterior),
            "kitchen" => Ok(PhotoType::Kitchen),
            "storage" => Ok(PhotoType::Storage),
            "ingredients" => Ok(PhotoType::Ingredients),
            "certificate" => Ok(PhotoType::Certificate),
            "other" => Ok(PhotoType::Other),
            other => Err(DomainError::invalid(
                "photo_type",
                format!("unknown photo type '{}'", other),
            )),
        }
    }
}

/// Photo evidence linked to an inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePhoto {
    pub id: i64,
    pub inspection_id: i64,
    pub document_id: Uuid,
    pub photo_type: PhotoType,
    pub caption: Option<String>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

/// Fields for attaching a photo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidencePhoto {
    pub inspection_id: i64,
    pub document_id: Uuid,
    pub photo_type: PhotoType,
    pub caption: Option<String>,
    pub location: Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scheduled(now: DateTime<Utc>) -> Inspection {
        Inspection {
            id: 1,
            application_id: 10,
            inspector_id: 7,
            status: InspectionStatus::Scheduled,
            visit_date: None,
            location: None,
            started_at: None,
            completed_at: None,
            notes: None,
            decision: None,
            signature: None,
            signed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_start_then_complete() {
        let now = Utc::now();
        let mut inspection = scheduled(now);
        inspection
            .start(now, Some(GeoPoint::new(-37.81, 144.96, now).with_accuracy(12.0)))
            .unwrap();
        assert_eq!(inspection.status, InspectionStatus::InProgress);
        assert_eq!(inspection.started_at, Some(now));

        inspection
            .complete(now, Decision::Approved, "Meets standards", Some("sig".into()))
            .unwrap();
        assert_eq!(inspection.status, InspectionStatus::Completed);
        assert_eq!(inspection.decision, Some(Decision::Approved));
        assert_eq!(inspection.signed_at, Some(now));
    }

    #[test]
    fn test_complete_requires_start() {
        let now = Utc::now();
        let mut inspection = scheduled(now);
        let err = inspection
            .complete(now, Decision::Approved, "Meets standards", None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Transition { .. }));
        assert_eq!(inspection.decision, None);
    }

    #[test]
    fn test_complete_requires_notes() {
        let now = Utc::now();
        let mut inspection = scheduled(now);
        inspection.start(now, None).unwrap();
        let err = inspection.complete(now, Decision::Rejected, "  ", None).unwrap_err();
        assert!(matches!(err, DomainError::Invalid { .. }));
        assert_eq!(inspection.status, InspectionStatus::InProgress);
    }

    #[test]
    fn test_implausible_location_rejected() {
        let now = Utc::now();
        let mut inspection = scheduled(now);
        assert!(inspection.start(now, Some(GeoPoint::new(123.0, 0.0, now))).is_err());
        assert_eq!(inspection.status, InspectionStatus::Scheduled);
    }

    #[test]
    fn test_cancel_only_while_open() {
        let now = Utc::now();
        let mut inspection = scheduled(now);
        inspection.notes = Some("Bring the supplier folder".to_string());
        assert!(inspection.cancel(now, "  ").is_err());
        inspection.cancel(now, "Store closed").unwrap();
        assert_eq!(inspection.status, InspectionStatus::Cancelled);
        assert_eq!(inspection.notes.as_deref(), Some("Bring the supplier folder"));
        assert!(!inspection.accepts_evidence());
        assert!(inspection.cancel(now, "again").is_err());
        assert!(inspection.start(now, None).is_err());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Start,
        Complete(Decision),
        Cancel,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Start),
            Just(Step::Complete(Decision::Approved)),
            Just(Step::Complete(Decision::Rejected)),
            Just(Step::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Decision is present exactly when the inspection is completed
        #[test]
        fn prop_decision_iff_completed(steps in prop::collection::vec(step_strategy(), 0..6)) {
            let now = Utc::now();
            let mut inspection = scheduled(now);
            for step in steps {
                let _ = match step {
                    Step::Start => inspection.start(now, None),
                    Step::Complete(d) => inspection.complete(now, d, "notes", None),
                    Step::Cancel => inspection.cancel(now, "reason"),
                };
                prop_assert_eq!(
                    inspection.decision.is_some(),
                    inspection.status == InspectionStatus::Completed
                );
                if inspection.status == InspectionStatus::InProgress {
                    prop_assert!(inspection.started_at.is_some());
                }
            }
        }
    }
}
