//! Owner notifications
//!
//! Message templates for each lifecycle event, and a [`Notifier`] that puts a
//! timeout around the gateway. Submission confirmations are required to
//! succeed; every other notification is best effort.

use std::sync::Arc;
use std::time::Duration;

use shared::{Application, Certificate, Inspection, Store};

use crate::error::{AppError, AppResult};
use crate::external::{EmailMessage, NotificationGateway};

/// Sends owner emails with a bounded wait
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn NotificationGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    async fn deliver(&self, message: &EmailMessage) -> AppResult<()> {
        match tokio::time::timeout(self.timeout, self.gateway.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::dependency(
                "email",
                format!("send timed out after {} ms", self.timeout.as_millis()),
            )),
        }
    }

    /// Send and propagate failure; the caller's operation aborts
    pub async fn send_required(&self, message: &EmailMessage) -> AppResult<()> {
        self.deliver(message).await.map_err(|e| {
            tracing::warn!(error = %e, to = %message.to, "Required notification failed");
            e
        })
    }

    /// Send and log failure; the caller's state change stands. The dropped
    /// failure is handed back tagged as fail-open.
    pub async fn send_best_effort(&self, message: &EmailMessage) -> Option<AppError> {
        let e = self.deliver(message).await.err()?.into_fail_open();
        tracing::warn!(
            error = %e,
            to = %message.to,
            subject = %message.subject,
            fail_open = true,
            "Notification dropped"
        );
        Some(e)
    }
}

// ============================================================================
// Message templates
// ============================================================================

fn to_owner(store: &Store, subject: String, body: String) -> EmailMessage {
    EmailMessage {
        to: store.owner.email.clone(),
        subject,
        body,
    }
}

pub fn application_received(store: &Store, application: &Application) -> EmailMessage {
    to_owner(
        store,
        format!("Application #{} received", application.id),
        format!(
            "Dear {},\n\n\
             We have received the halal certification application for {} ({}).\n\
             Your application number is #{}. We will be in touch once it has been reviewed.\n",
            store.owner.name, store.business_name, store.address, application.id
        ),
    )
}

pub fn application_under_review(store: &Store, application: &Application) -> EmailMessage {
    to_owner(
        store,
        format!("Application #{} is under review", application.id),
        format!(
            "Dear {},\n\n\
             Your application for {} is now under review.\n\
             An inspector will contact you to arrange a site visit.\n",
            store.owner.name, store.business_name
        ),
    )
}

pub fn application_approved(
    store: &Store,
    application: &Application,
    certificate: &Certificate,
) -> EmailMessage {
    to_owner(
        store,
        format!("Application #{} approved", application.id),
        format!(
            "Dear {},\n\n\
             Congratulations, {} has been granted halal certification.\n\n\
             Certificate number: {}\n\
             Valid until: {}\n\
             Verify online: {}\n",
            store.owner.name,
            store.business_name,
            certificate.certificate_number,
            certificate.expires_at.format("%d %B %Y"),
            certificate.verification_url
        ),
    )
}

pub fn application_rejected(
    store: &Store,
    application: &Application,
    notes: Option<&str>,
) -> EmailMessage {
    let reason = notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("No reason was recorded.");
    to_owner(
        store,
        format!("Application #{} was not approved", application.id),
        format!(
            "Dear {},\n\n\
             We are unable to certify {} at this time.\n\n\
             Reason: {}\n\n\
             You are welcome to submit a new application once these points are addressed.\n",
            store.owner.name, store.business_name, reason
        ),
    )
}

pub fn inspection_scheduled(store: &Store, inspection: &Inspection) -> Option<EmailMessage> {
    let visit = inspection.visit_date?;
    Some(to_owner(
        store,
        "Inspection scheduled".to_string(),
        format!(
            "Dear {},\n\n\
             An inspection of {} has been scheduled for {}.\n\
             Please ensure the premises are accessible at that time.\n",
            store.owner.name,
            store.business_name,
            visit.format("%d %B %Y %H:%M UTC")
        ),
    ))
}

pub fn certificate_revoked(store: &Store, certificate: &Certificate, reason: &str) -> EmailMessage {
    to_owner(
        store,
        format!("Certificate {} revoked", certificate.certificate_number),
        format!(
            "Dear {},\n\n\
             Halal certificate {} for {} has been revoked and is no longer valid.\n\n\
             Reason: {}\n",
            store.owner.name, certificate.certificate_number, store.business_name, reason
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use shared::{
        Address, ApplicationStatus, BusinessType, CertificateNumber, CertificateStatus,
        EmployeeBand, InspectionStatus, OwnerContact,
    };

    fn store() -> Store {
        let now = Utc::now();
        Store {
            id: 1,
            business_name: "Test Cafe".to_string(),
            business_type: BusinessType::Cafe,
            address: Address {
                street: "1 Collins St".to_string(),
                suburb: "Melbourne".to_string(),
                state: "VIC".to_string(),
                postcode: "3000".to_string(),
            },
            abn: "12345678901".to_string(),
            owner: OwnerContact {
                name: "Amira".to_string(),
                email: "owner@testcafe.com.au".to_string(),
                phone: "0412345678".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn application() -> Application {
        let now = Utc::now();
        Application {
            id: 12,
            store_id: 1,
            status: ApplicationStatus::Approved,
            products: vec!["Tea".to_string()],
            suppliers: vec![],
            employee_band: EmployeeBand::UpToFive,
            operating_hours: "9-5".to_string(),
            documents: vec![],
            notes: None,
            review_notes: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_approval_mentions_certificate() {
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let certificate = Certificate {
            id: 1,
            certificate_number: CertificateNumber::new(2026, 42).unwrap(),
            application_id: 12,
            store_id: 1,
            status: CertificateStatus::Active,
            issued_by: 7,
            issued_at: issued,
            expires_at: shared::expiry_for(issued, 365),
            verification_url: "https://halal.example.com/verify/HAL-2026-0042".to_string(),
            revoked_at: None,
            revocation_reason: None,
        };
        let message = application_approved(&store(), &application(), &certificate);
        assert_eq!(message.to, "owner@testcafe.com.au");
        assert!(message.body.contains("HAL-2026-0042"));
        assert!(message.body.contains("01 March 2027"));
    }

    #[test]
    fn test_rejection_includes_reason() {
        let message = application_rejected(&store(), &application(), Some("Unverified supplier"));
        assert!(message.body.contains("Reason: Unverified supplier"));

        let message = application_rejected(&store(), &application(), Some("  "));
        assert!(message.body.contains("No reason was recorded."));
    }

    #[test]
    fn test_scheduled_message_needs_visit_date() {
        let now = Utc::now();
        let mut inspection = Inspection {
            id: 1,
            application_id: 12,
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
        };
        assert!(inspection_scheduled(&store(), &inspection).is_none());

        inspection.visit_date = Some(Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap());
        let message = inspection_scheduled(&store(), &inspection).unwrap();
        assert!(message.body.contains("04 May 2026 10:30 UTC"));
    }

    struct SlowGateway;

    #[async_trait]
    impl NotificationGateway for SlowGateway {
        async fn send(&self, _message: &EmailMessage) -> AppResult<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_required_send_times_out() {
        let notifier = Notifier::new(Arc::new(SlowGateway), Duration::from_millis(10));
        let message = application_received(&store(), &application());
        let err = notifier.send_required(&message).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Dependency {
                service: "email",
                fail_open: false,
                ..
            }
        ));

        let dropped = notifier.send_best_effort(&message).await;
        assert!(matches!(
            dropped,
            Some(AppError::Dependency {
                service: "email",
                fail_open: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_best_effort_delivery_reports_nothing() {
        struct OkGateway;

        #[async_trait]
        impl NotificationGateway for OkGateway {
            async fn send(&self, _message: &EmailMessage) -> AppResult<()> {
                Ok(())
            }
        }

        let notifier = Notifier::new(Arc::new(OkGateway), Duration::from_millis(50));
        let message = application_received(&store(), &application());
        assert!(notifier.send_best_effort(&message).await.is_none());
    }
}
