//! Application lifecycle
//!
//! Owns the `pending -> under_review -> approved | rejected` state machine.
//! Approval and certificate issuance commit together or not at all. Audit
//! entries for status changes and status emails are written after commit and
//! never undo the change; the submission confirmation is the exception and
//! is part of the submit transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared::{
    Actor, Application, ApplicationStatus, AuditAction, Certificate, EntityType, Inspection,
    NewAuditEntry, Store, SubmitApplicationInput,
};

use crate::error::{AppError, AppResult};
use crate::external::PaymentVerifier;
use crate::repository::{Repository, UnitOfWork};
use crate::services::audit::{audit_entry, AuditRecorder};
use crate::services::issuer::CertificateIssuer;
use crate::services::notification::{self, Notifier};

/// Result of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedApplication {
    pub application: Application,
    pub store: Store,
    /// The owner email matched an existing store
    pub existing_store: bool,
}

/// Read view of one application
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetails {
    pub application: Application,
    pub store: Store,
    pub inspections: Vec<Inspection>,
    pub certificates: Vec<Certificate>,
}

/// A status change applied inside a unit of work but not yet committed
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub application: Application,
    pub previous_status: ApplicationStatus,
    pub store: Store,
    /// Issued when the transition was to `approved`
    pub certificate: Option<Certificate>,
    pub notes: Option<String>,
    actor: Actor,
}

impl TransitionOutcome {
    fn audit_entries(&self) -> Vec<NewAuditEntry> {
        let mut entries = vec![audit_entry(
            Some(&self.actor),
            AuditAction::for_application_status(self.application.status),
            EntityType::Application,
            self.application.id,
            json!({
                "previous_status": self.previous_status,
                "new_status": self.application.status,
                "notes": self.notes,
                "certificate_number": self.certificate.as_ref().map(|c| c.certificate_number.as_str()),
            }),
        )];
        if let Some(certificate) = &self.certificate {
            entries.push(audit_entry(
                Some(&self.actor),
                AuditAction::CertificateIssued,
                EntityType::Certificate,
                certificate.id,
                json!({
                    "certificate_number": certificate.certificate_number.as_str(),
                    "application_id": certificate.application_id,
                    "store_id": certificate.store_id,
                    "expires_at": certificate.expires_at,
                }),
            ));
        }
        entries
    }
}

#[derive(Clone)]
pub struct ApplicationLifecycle {
    repo: Arc<dyn Repository>,
    issuer: CertificateIssuer,
    notifier: Notifier,
    audit: AuditRecorder,
    payments: Arc<dyn PaymentVerifier>,
    payment_timeout: Duration,
}

impl ApplicationLifecycle {
    pub fn new(
        repo: Arc<dyn Repository>,
        issuer: CertificateIssuer,
        notifier: Notifier,
        payments: Arc<dyn PaymentVerifier>,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(repo.clone()),
            repo,
            issuer,
            notifier,
            payments,
            payment_timeout,
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Validate, confirm payment, resolve the store and create the application
    ///
    /// The application row, its `APPLICATION_SUBMITTED` entry and the owner's
    /// confirmation email succeed together; any failure leaves no trace.
    pub async fn submit(
        &self,
        input: SubmitApplicationInput,
        source_ip: Option<String>,
    ) -> AppResult<SubmittedApplication> {
        let submission = input.into_validated()?;

        if let Some(reference) = &submission.payment_reference {
            self.verify_payment(reference).await?;
        }

        let mut uow = self.repo.begin().await?;

        let (store, existing_store) = uow.resolve_store(&submission.store).await?;

        let new_application = submission.into_application(store.id);
        let application = uow.insert_application(&new_application).await?;

        let mut entry = audit_entry(
            None,
            AuditAction::ApplicationSubmitted,
            EntityType::Application,
            application.id,
            json!({
                "store_id": store.id,
                "business_name": store.business_name,
                "existing_store": existing_store,
                "payment_reference": application.payment_reference,
                "documents": application.documents.len(),
            }),
        );
        entry.ip_address = source_ip;
        uow.append_audit(&entry).await?;

        self.notifier
            .send_required(&notification::application_received(&store, &application))
            .await?;

        uow.commit().await?;

        tracing::info!(
            application_id = application.id,
            store_id = store.id,
            existing_store,
            "Application submitted"
        );

        Ok(SubmittedApplication {
            application,
            store,
            existing_store,
        })
    }

    async fn verify_payment(&self, reference: &str) -> AppResult<()> {
        let verification =
            match tokio::time::timeout(self.payment_timeout, self.payments.verify(reference)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AppError::dependency(
                        "payments",
                        format!(
                            "verification timed out after {} ms",
                            self.payment_timeout.as_millis()
                        ),
                    ))
                }
            };

        if !verification.succeeded {
            return Err(AppError::PaymentNotVerified(format!(
                "payment {} has not succeeded",
                reference
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Move an application to `next` and, for approval, issue its certificate
    pub async fn transition_status(
        &self,
        application_id: i64,
        next: ApplicationStatus,
        notes: Option<String>,
        actor: &Actor,
    ) -> AppResult<TransitionOutcome> {
        let mut uow = self.repo.begin().await?;
        let outcome = self
            .apply_transition(uow.as_mut(), application_id, next, notes, actor, Utc::now())
            .await?;
        uow.commit().await?;

        self.after_commit(&outcome).await;
        Ok(outcome)
    }

    /// Apply a transition inside an open unit of work
    ///
    /// `pending -> approved | rejected` needs an admin. Approval by anyone
    /// else needs a completed inspection with an approved decision, which may
    /// have been saved earlier in the same unit of work.
    pub(crate) async fn apply_transition(
        &self,
        uow: &mut dyn UnitOfWork,
        application_id: i64,
        next: ApplicationStatus,
        notes: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> AppResult<TransitionOutcome> {
        let current = uow
            .lock_application(application_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Application".to_string()))?;

        current.status.check_transition(next, actor.is_admin())?;

        if next == ApplicationStatus::Approved
            && !actor.is_admin()
            && !uow.has_approved_inspection(application_id).await?
        {
            return Err(AppError::InvalidTransition(format!(
                "application {} has no approved inspection",
                application_id
            )));
        }

        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let application = uow
            .update_application_status(application_id, current.status, next, notes.as_deref())
            .await?;

        let store = uow
            .get_store(application.store_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

        let certificate = if next == ApplicationStatus::Approved {
            Some(
                self.issuer
                    .issue(uow, &store, &application, actor.user_id, now)
                    .await?,
            )
        } else {
            None
        };

        Ok(TransitionOutcome {
            application,
            previous_status: current.status,
            store,
            certificate,
            notes,
            actor: actor.clone(),
        })
    }

    /// Audit and notify for a committed transition
    pub(crate) async fn after_commit(&self, outcome: &TransitionOutcome) {
        tracing::info!(
            application_id = outcome.application.id,
            from = %outcome.previous_status,
            to = %outcome.application.status,
            actor_id = outcome.actor.user_id,
            "Application status changed"
        );

        for entry in outcome.audit_entries() {
            self.audit.record(entry).await;
        }

        let message = match (outcome.application.status, &outcome.certificate) {
            (ApplicationStatus::UnderReview, _) => Some(notification::application_under_review(
                &outcome.store,
                &outcome.application,
            )),
            (ApplicationStatus::Approved, Some(certificate)) => Some(
                notification::application_approved(&outcome.store, &outcome.application, certificate),
            ),
            (ApplicationStatus::Rejected, _) => Some(notification::application_rejected(
                &outcome.store,
                &outcome.application,
                outcome.notes.as_deref(),
            )),
            _ => None,
        };
        if let Some(message) = message {
            self.notifier.send_best_effort(&message).await;
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get(&self, application_id: i64) -> AppResult<ApplicationDetails> {
        let application = self
            .repo
            .get_application(application_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Application".to_string()))?;
        let store = self
            .repo
            .get_store(application.store_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Store".to_string()))?;
        let inspections = self
            .repo
            .list_inspections_for_application(application_id)
            .await?;
        let certificates = self
            .repo
            .list_certificates_for_application(application_id)
            .await?;

        Ok(ApplicationDetails {
            application,
            store,
            inspections,
            certificates,
        })
    }

    /// Newest first, optionally filtered by status
    pub async fn list(&self, status: Option<ApplicationStatus>) -> AppResult<Vec<Application>> {
        self.repo.list_applications(status).await
    }
}
