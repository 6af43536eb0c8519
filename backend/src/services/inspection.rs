//! Inspection lifecycle
//!
//! `scheduled -> in_progress -> completed`, with `cancelled` reachable from
//! either open state. Completing an inspection drives the owning application
//! to the matching terminal status in the same unit of work, so the
//! inspection, the application and any certificate commit together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    Actor, Application, ApplicationStatus, AuditAction, Certificate, Decision, EntityType,
    EvidencePhoto, GeoPoint, Inspection, NewEvidencePhoto, NewInspection, PhotoType, Role,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repository::{Repository, UnitOfWork};
use crate::services::application::ApplicationLifecycle;
use crate::services::audit::{audit_entry, AuditRecorder};
use crate::services::notification::{self, Notifier};

/// Input for scheduling a visit
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInspectionInput {
    pub application_id: i64,
    pub inspector_id: i64,
    pub visit_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Input for attaching an evidence photo
#[derive(Debug, Clone, Deserialize)]
pub struct AttachPhotoInput {
    pub document_id: Uuid,
    pub photo_type: PhotoType,
    pub caption: Option<String>,
    pub location: Option<GeoPoint>,
}

/// Input for completing a visit
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteInspectionInput {
    pub decision: Decision,
    pub notes: String,
    pub signature: Option<String>,
}

/// Result of completing an inspection
#[derive(Debug, Clone, Serialize)]
pub struct CompletedInspection {
    pub inspection: Inspection,
    pub application: Application,
    pub certificate: Option<Certificate>,
}

/// An inspection with its evidence
#[derive(Debug, Clone, Serialize)]
pub struct InspectionDetails {
    pub inspection: Inspection,
    pub photos: Vec<EvidencePhoto>,
}

#[derive(Clone)]
pub struct InspectionLifecycle {
    repo: Arc<dyn Repository>,
    applications: ApplicationLifecycle,
    notifier: Notifier,
    audit: AuditRecorder,
}

/// Lock an inspection and check the actor may act on it
async fn lock_for(
    uow: &mut dyn UnitOfWork,
    inspection_id: i64,
    actor: &Actor,
    admin_allowed: bool,
) -> AppResult<Inspection> {
    let inspection = uow
        .lock_inspection(inspection_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;

    if !inspection.is_assigned_to(actor.user_id) && !(admin_allowed && actor.is_admin()) {
        return Err(AppError::Forbidden(format!(
            "inspection {} is assigned to another inspector",
            inspection_id
        )));
    }
    Ok(inspection)
}

impl InspectionLifecycle {
    pub fn new(
        repo: Arc<dyn Repository>,
        applications: ApplicationLifecycle,
        notifier: Notifier,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(repo.clone()),
            repo,
            applications,
            notifier,
        }
    }

    /// Create a scheduled inspection; a pending application moves to review.
    ///
    /// Administrators may assign any active inspector. An inspector may only
    /// schedule a visit for themselves.
    pub async fn schedule(
        &self,
        input: ScheduleInspectionInput,
        actor: &Actor,
    ) -> AppResult<Inspection> {
        if !actor.is_admin() && actor.user_id != input.inspector_id {
            return Err(AppError::Forbidden(
                "inspectors may only schedule their own visits".to_string(),
            ));
        }
        self.require_inspector(input.inspector_id).await?;

        let now = Utc::now();
        let mut uow = self.repo.begin().await?;

        let application = uow
            .lock_application(input.application_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Application".to_string()))?;
        if application.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "application {} is already {}",
                application.id, application.status
            )));
        }

        let inspection = uow
            .insert_inspection(&NewInspection {
                application_id: input.application_id,
                inspector_id: input.inspector_id,
                visit_date: input.visit_date,
                notes: input
                    .notes
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
            })
            .await?;

        let review = if application.status == ApplicationStatus::Pending {
            Some(
                self.applications
                    .apply_transition(
                        uow.as_mut(),
                        application.id,
                        ApplicationStatus::UnderReview,
                        None,
                        actor,
                        now,
                    )
                    .await?,
            )
        } else {
            None
        };

        let store = uow
            .get_store(application.store_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

        uow.commit().await?;

        tracing::info!(
            inspection_id = inspection.id,
            application_id = inspection.application_id,
            inspector_id = inspection.inspector_id,
            "Inspection scheduled"
        );

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::InspectionCreated,
                EntityType::Inspection,
                inspection.id,
                json!({
                    "application_id": inspection.application_id,
                    "inspector_id": inspection.inspector_id,
                    "visit_date": inspection.visit_date,
                }),
            ))
            .await;

        if let Some(review) = &review {
            self.applications.after_commit(review).await;
        }

        if let Some(message) = notification::inspection_scheduled(&store, &inspection) {
            self.notifier.send_best_effort(&message).await;
        }

        Ok(inspection)
    }

    async fn require_inspector(&self, inspector_id: i64) -> AppResult<()> {
        match self.repo.get_user(inspector_id).await? {
            Some(user) if user.is_active && user.role == Role::Inspector => Ok(()),
            Some(_) => Err(AppError::validation(
                "inspector_id",
                format!("user {} is not an active inspector", inspector_id),
            )),
            None => Err(AppError::validation(
                "inspector_id",
                format!("no inspector with id {}", inspector_id),
            )),
        }
    }

    /// Begin the visit; only the assigned inspector may start it
    pub async fn start(
        &self,
        inspection_id: i64,
        actor: &Actor,
        location: Option<GeoPoint>,
    ) -> AppResult<Inspection> {
        let mut uow = self.repo.begin().await?;
        let mut inspection = lock_for(uow.as_mut(), inspection_id, actor, false).await?;

        let expected = inspection.status;
        inspection.start(Utc::now(), location)?;
        let inspection = uow.save_inspection(&inspection, expected).await?;
        uow.commit().await?;

        tracing::info!(inspection_id, inspector_id = actor.user_id, "Inspection started");

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::InspectionStarted,
                EntityType::Inspection,
                inspection.id,
                json!({
                    "application_id": inspection.application_id,
                    "location": inspection.location,
                }),
            ))
            .await;

        Ok(inspection)
    }

    /// Link an evidence photo; allowed until the inspection is cancelled
    pub async fn attach_photo(
        &self,
        inspection_id: i64,
        input: AttachPhotoInput,
        actor: &Actor,
    ) -> AppResult<EvidencePhoto> {
        if let Some(point) = &input.location {
            if !point.is_plausible() {
                return Err(AppError::validation("location", "Coordinates are out of range"));
            }
        }

        let mut uow = self.repo.begin().await?;
        let inspection = lock_for(uow.as_mut(), inspection_id, actor, true).await?;
        if !inspection.accepts_evidence() {
            return Err(AppError::InvalidTransition(format!(
                "inspection {} is {} and no longer accepts evidence",
                inspection_id, inspection.status
            )));
        }

        let photo = uow
            .insert_photo(&NewEvidencePhoto {
                inspection_id,
                document_id: input.document_id,
                photo_type: input.photo_type,
                caption: input
                    .caption
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
                location: input.location,
            })
            .await?;
        uow.commit().await?;

        tracing::debug!(inspection_id, photo_id = photo.id, "Evidence photo attached");

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::InspectionPhotoAdded,
                EntityType::Inspection,
                inspection_id,
                json!({
                    "photo_id": photo.id,
                    "document_id": photo.document_id,
                    "photo_type": photo.photo_type,
                    "inspection_status": inspection.status,
                }),
            ))
            .await;

        Ok(photo)
    }

    /// Record the verdict and drive the application to the matching status
    pub async fn complete(
        &self,
        inspection_id: i64,
        input: CompleteInspectionInput,
        actor: &Actor,
    ) -> AppResult<CompletedInspection> {
        let now = Utc::now();
        let mut uow = self.repo.begin().await?;
        let mut inspection = lock_for(uow.as_mut(), inspection_id, actor, false).await?;

        let expected = inspection.status;
        inspection.complete(now, input.decision, &input.notes, input.signature)?;
        let inspection = uow.save_inspection(&inspection, expected).await?;

        let target = match input.decision {
            Decision::Approved => ApplicationStatus::Approved,
            Decision::Rejected => ApplicationStatus::Rejected,
        };
        let outcome = self
            .applications
            .apply_transition(
                uow.as_mut(),
                inspection.application_id,
                target,
                inspection.notes.clone(),
                actor,
                now,
            )
            .await?;

        uow.commit().await?;

        tracing::info!(
            inspection_id,
            application_id = inspection.application_id,
            decision = input.decision.as_str(),
            "Inspection completed"
        );

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::InspectionCompleted,
                EntityType::Inspection,
                inspection.id,
                json!({
                    "application_id": inspection.application_id,
                    "decision": input.decision,
                    "signature_captured": inspection.signature.is_some(),
                }),
            ))
            .await;
        self.applications.after_commit(&outcome).await;

        Ok(CompletedInspection {
            inspection,
            application: outcome.application,
            certificate: outcome.certificate,
        })
    }

    /// Cancel an open inspection; the application is left as it is
    pub async fn cancel(
        &self,
        inspection_id: i64,
        reason: &str,
        actor: &Actor,
    ) -> AppResult<Inspection> {
        let mut uow = self.repo.begin().await?;
        let mut inspection = lock_for(uow.as_mut(), inspection_id, actor, true).await?;

        let expected = inspection.status;
        inspection.cancel(Utc::now(), reason)?;
        let inspection = uow.save_inspection(&inspection, expected).await?;
        uow.commit().await?;

        tracing::info!(inspection_id, "Inspection cancelled");

        self.audit
            .record(audit_entry(
                Some(actor),
                AuditAction::InspectionCancelled,
                EntityType::Inspection,
                inspection.id,
                json!({
                    "application_id": inspection.application_id,
                    "previous_status": expected,
                    "reason": reason.trim(),
                }),
            ))
            .await;

        Ok(inspection)
    }

    pub async fn get(&self, inspection_id: i64) -> AppResult<InspectionDetails> {
        let inspection = self
            .repo
            .get_inspection(inspection_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;
        let photos = self.repo.list_photos(inspection_id).await?;
        Ok(InspectionDetails { inspection, photos })
    }

    pub async fn list_for_inspector(&self, inspector_id: i64) -> AppResult<Vec<Inspection>> {
        self.repo.list_inspections_for_inspector(inspector_id).await
    }

    pub async fn list_for_application(&self, application_id: i64) -> AppResult<Vec<Inspection>> {
        self.repo
            .list_inspections_for_application(application_id)
            .await
    }
}
