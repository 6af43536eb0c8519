//! Certificate registry tests
//!
//! Covers number uniqueness under concurrent approvals, public lookup,
//! revocation, expiry derived at read time, and the explicit expiry sweep.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{admin, Harness, RepeatingNumberSource};
use halal_backend::error::AppError;
use shared::{ApplicationStatus, AuditAction, CertificateStatus, EntityType};

// ============================================================================
// Issuance
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_get_unique_numbers() {
    // Every suffix is drawn twice, so half of all draws collide
    let h = Arc::new(Harness::with_numbers(Arc::new(RepeatingNumberSource::default())));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                let submitted = h.submit(&format!("owner{}@testcafe.com.au", i)).await;
                h.applications
                    .transition_status(
                        submitted.application.id,
                        ApplicationStatus::Approved,
                        None,
                        &admin(),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(outcome.certificate.is_some());
    }

    let certificates = h.repo.all_certificates().await;
    assert_eq!(certificates.len(), 20);
    let numbers: HashSet<String> = certificates
        .iter()
        .map(|c| c.certificate_number.to_string())
        .collect();
    assert_eq!(numbers.len(), 20);
}

#[tokio::test]
async fn test_issued_certificate_is_valid_for_a_year() {
    let h = Harness::new();
    let (_, certificate) = h.approved("owner@testcafe.com.au").await;

    assert_eq!(certificate.status, CertificateStatus::Active);
    assert_eq!((certificate.expires_at - certificate.issued_at).num_days(), 365);

    let view = h
        .certificates
        .get_by_number(certificate.certificate_number.as_str(), Utc::now())
        .await
        .unwrap();
    assert!(view.valid);
    assert!(!view.is_expired);
    assert_eq!(view.status, CertificateStatus::Active);
    assert_eq!(view.store.business_name, "Test Cafe");
    assert!((363..=365).contains(&view.days_until_expiry));
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn test_unknown_or_malformed_number_is_not_found() {
    let h = Harness::new();
    h.approved("owner@testcafe.com.au").await;

    for number in ["HAL-1999-0001", "not-a-number", ""] {
        let err = h
            .certificates
            .get_by_number(number, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)), "{}", number);
    }
}

#[tokio::test]
async fn test_search_by_number_then_store() {
    let h = Harness::new();
    let (_, certificate) = h.approved("owner@testcafe.com.au").await;
    let now = Utc::now();

    let lowercase = certificate.certificate_number.as_str().to_lowercase();
    let by_number = h.certificates.search(&lowercase, now).await.unwrap().unwrap();
    assert_eq!(by_number.certificate.id, certificate.id);

    for query in ["test cafe", "BRUNSWICK", "Lygon"] {
        let found = h.certificates.search(query, now).await.unwrap();
        assert_eq!(found.map(|v| v.certificate.id), Some(certificate.id), "{}", query);
    }

    assert!(h
        .certificates
        .search("Unknown Butcher", now)
        .await
        .unwrap()
        .is_none());
    assert!(h.certificates.search("   ", now).await.unwrap().is_none());
}

// ============================================================================
// Revocation
// ============================================================================

#[tokio::test]
async fn test_revoke_is_final() {
    let h = Harness::new();
    let (_, certificate) = h.approved("owner@testcafe.com.au").await;

    let err = h
        .certificates
        .revoke(certificate.id, "  ", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let revoked = h
        .certificates
        .revoke(certificate.id, "Supplier lost certification", &admin())
        .await
        .unwrap();
    assert_eq!(revoked.status, CertificateStatus::Revoked);
    assert!(revoked.revoked_at.is_some());
    assert_eq!(
        revoked.revocation_reason.as_deref(),
        Some("Supplier lost certification")
    );

    let err = h
        .certificates
        .revoke(certificate.id, "Again", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRevoked(_)));

    let view = h.certificates.get(certificate.id, Utc::now()).await.unwrap();
    assert!(!view.valid);
    assert_eq!(view.status, CertificateStatus::Revoked);
    assert_eq!(
        view.certificate.revocation_reason.as_deref(),
        Some("Supplier lost certification")
    );

    let actions: Vec<AuditAction> = h
        .audit
        .history(EntityType::Certificate, certificate.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![AuditAction::CertificateIssued, AuditAction::CertificateRevoked]
    );

    let last = h.mailbox.sent().pop().unwrap();
    assert_eq!(
        last.subject,
        format!("Certificate {} revoked", certificate.certificate_number)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_revocations_apply_once() {
    let h = Harness::new();
    let (_, certificate) = h.approved("owner@testcafe.com.au").await;

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let registry = h.certificates.clone();
            tokio::spawn(async move {
                registry
                    .revoke(certificate.id, &format!("Complaint {}", i), &admin())
                    .await
            })
        })
        .collect();

    let mut revoked = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(certificate) => revoked.push(certificate),
            Err(e) => assert!(
                matches!(e, AppError::AlreadyRevoked(_) | AppError::Conflict(_)),
                "{:?}",
                e
            ),
        }
    }
    assert_eq!(revoked.len(), 1);

    let view = h.certificates.get(certificate.id, Utc::now()).await.unwrap();
    assert_eq!(view.status, CertificateStatus::Revoked);
    assert_eq!(
        view.certificate.revocation_reason,
        revoked[0].revocation_reason
    );

    let revocations = h
        .audit
        .history(EntityType::Certificate, certificate.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == AuditAction::CertificateRevoked)
        .count();
    assert_eq!(revocations, 1);

    let emails = h
        .mailbox
        .subjects()
        .into_iter()
        .filter(|s| s.ends_with("revoked"))
        .count();
    assert_eq!(emails, 1);
}

#[tokio::test]
async fn test_revoke_missing_certificate() {
    let h = Harness::new();
    let err = h
        .certificates
        .revoke(77, "Fraud", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_expiry_is_derived_at_read_time() {
    let h = Harness::new();
    let (_, certificate) = h.approved("owner@testcafe.com.au").await;
    let later = Utc::now() + Duration::days(366);

    let view = h.certificates.get(certificate.id, later).await.unwrap();
    assert!(view.is_expired);
    assert!(!view.valid);
    assert_eq!(view.status, CertificateStatus::Expired);
    assert!(view.days_until_expiry < 0);

    // Nothing was persisted by reading
    assert_eq!(view.certificate.status, CertificateStatus::Active);
    let stored = h.repo.all_certificates().await;
    assert_eq!(stored[0].status, CertificateStatus::Active);
}

#[tokio::test]
async fn test_expiry_sweep_persists_once() {
    let h = Harness::new();
    let (_, lapsed) = h.approved("one@testcafe.com.au").await;
    let (_, revoked) = h.approved("two@testcafe.com.au").await;
    h.certificates
        .revoke(revoked.id, "Closed down", &admin())
        .await
        .unwrap();
    let later = Utc::now() + Duration::days(400);

    assert!(h
        .certificates
        .expire_sweep(Some(&admin()), Utc::now())
        .await
        .unwrap()
        .is_empty());

    let expired = h
        .certificates
        .expire_sweep(Some(&admin()), later)
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, lapsed.id);
    assert_eq!(expired[0].status, CertificateStatus::Expired);

    assert!(h
        .certificates
        .expire_sweep(None, later)
        .await
        .unwrap()
        .is_empty());

    let history = h
        .audit
        .history(EntityType::Certificate, lapsed.id)
        .await
        .unwrap();
    assert_eq!(history.last().map(|e| e.action), Some(AuditAction::CertificateExpired));

    let view = h.certificates.get(revoked.id, later).await.unwrap();
    assert_eq!(view.status, CertificateStatus::Revoked);
}

#[tokio::test]
async fn test_audit_export_has_header_and_rows() {
    let h = Harness::new();
    let (application, _) = h.approved("owner@testcafe.com.au").await;

    let csv = h
        .audit
        .export_csv(EntityType::Application, application.id)
        .await
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "id,created_at,actor_id,action,entity_type,entity_id,ip_address,details"
    );
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("APPLICATION_SUBMITTED"));
    assert!(lines[2].contains("APPLICATION_APPROVED"));
}
