//! Inspection lifecycle tests
//!
//! Scheduling, the assigned-inspector rule, evidence, and the single unit of
//! work that completes a visit, decides the application and issues the
//! certificate.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{
    admin, inspector, FixedNumberSource, Harness, ADMIN_ID, INSPECTOR_ID, OTHER_INSPECTOR_ID,
    RETIRED_INSPECTOR_ID,
};
use halal_backend::error::AppError;
use halal_backend::services::{AttachPhotoInput, CompleteInspectionInput, ScheduleInspectionInput};
use shared::{
    Actor, ApplicationStatus, AuditAction, Decision, EntityType, GeoPoint, InspectionStatus,
    PhotoType,
};
use uuid::Uuid;

fn melbourne() -> GeoPoint {
    GeoPoint::new(-37.7667, 144.9610, Utc::now()).with_accuracy(12.0)
}

fn verdict(decision: Decision, notes: &str) -> CompleteInspectionInput {
    CompleteInspectionInput {
        decision,
        notes: notes.to_string(),
        signature: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
    }
}

fn kitchen_photo() -> AttachPhotoInput {
    AttachPhotoInput {
        document_id: Uuid::new_v4(),
        photo_type: PhotoType::Kitchen,
        caption: Some("Separate preparation area".to_string()),
        location: None,
    }
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn test_schedule_moves_pending_application_to_review() {
    let h = Harness::new();
    let (application, inspection) = h.scheduled("owner@testcafe.com.au").await;

    assert_eq!(inspection.status, InspectionStatus::Scheduled);
    assert_eq!(inspection.inspector_id, INSPECTOR_ID);
    assert_eq!(inspection.application_id, application.id);

    let details = h.applications.get(application.id).await.unwrap();
    assert_eq!(details.application.status, ApplicationStatus::UnderReview);
    assert_eq!(details.inspections.len(), 1);

    let created = h
        .audit
        .history(EntityType::Inspection, inspection.id)
        .await
        .unwrap();
    assert_eq!(created[0].action, AuditAction::InspectionCreated);
    assert_eq!(created[0].actor_id, Some(ADMIN_ID));

    let subjects = h.mailbox.subjects();
    assert!(subjects.contains(&format!("Application #{} is under review", application.id)));
    assert!(subjects.contains(&"Inspection scheduled".to_string()));
}

#[tokio::test]
async fn test_second_inspection_keeps_review_status() {
    let h = Harness::new();
    let (application, _) = h.scheduled("owner@testcafe.com.au").await;

    let again = h
        .inspections
        .schedule(
            ScheduleInspectionInput {
                application_id: application.id,
                inspector_id: OTHER_INSPECTOR_ID,
                visit_date: None,
                notes: Some("Follow-up visit".to_string()),
            },
            &admin(),
        )
        .await
        .unwrap();

    assert_eq!(again.notes.as_deref(), Some("Follow-up visit"));
    assert_eq!(
        h.inspections
            .list_for_application(application.id)
            .await
            .unwrap()
            .len(),
        2
    );
    let history = h
        .audit
        .history(EntityType::Application, application.id)
        .await
        .unwrap();
    let reviews = history
        .iter()
        .filter(|e| e.action == AuditAction::ApplicationUnderReview)
        .count();
    assert_eq!(reviews, 1);
}

#[tokio::test]
async fn test_schedule_on_decided_application_fails() {
    let h = Harness::new();
    let (application, _) = h.approved("owner@testcafe.com.au").await;

    let err = h
        .inspections
        .schedule(
            ScheduleInspectionInput {
                application_id: application.id,
                inspector_id: INSPECTOR_ID,
                visit_date: None,
                notes: None,
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let err = h
        .inspections
        .schedule(
            ScheduleInspectionInput {
                application_id: 999,
                inspector_id: INSPECTOR_ID,
                visit_date: None,
                notes: None,
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

fn visit_for(application_id: i64, inspector_id: i64) -> ScheduleInspectionInput {
    ScheduleInspectionInput {
        application_id,
        inspector_id,
        visit_date: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_inspector_schedules_own_visit() {
    let h = Harness::new();
    let submitted = h.submit("owner@testcafe.com.au").await;
    let application_id = submitted.application.id;

    let err = h
        .inspections
        .schedule(visit_for(application_id, OTHER_INSPECTOR_ID), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let inspection = h
        .inspections
        .schedule(visit_for(application_id, INSPECTOR_ID), &inspector())
        .await
        .unwrap();
    assert_eq!(inspection.inspector_id, INSPECTOR_ID);

    let details = h.applications.get(application_id).await.unwrap();
    assert_eq!(details.application.status, ApplicationStatus::UnderReview);

    let created = h
        .audit
        .history(EntityType::Inspection, inspection.id)
        .await
        .unwrap();
    assert_eq!(created[0].actor_id, Some(INSPECTOR_ID));
}

#[tokio::test]
async fn test_schedule_requires_active_inspector() {
    let h = Harness::new();
    let submitted = h.submit("owner@testcafe.com.au").await;
    let application_id = submitted.application.id;

    for assignee in [404, ADMIN_ID, RETIRED_INSPECTOR_ID] {
        let err = h
            .inspections
            .schedule(visit_for(application_id, assignee), &admin())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AppError::Validation { field, .. } if field == "inspector_id"),
            "assignee {}: {:?}",
            assignee,
            err
        );
    }

    // nothing was written
    let details = h.applications.get(application_id).await.unwrap();
    assert_eq!(details.application.status, ApplicationStatus::Pending);
    assert!(details.inspections.is_empty());
}

// ============================================================================
// Visit
// ============================================================================

#[tokio::test]
async fn test_approved_visit_issues_certificate() {
    let h = Harness::new();
    let (application, inspection) = h.scheduled("owner@testcafe.com.au").await;

    let started = h
        .inspections
        .start(inspection.id, &inspector(), Some(melbourne()))
        .await
        .unwrap();
    assert_eq!(started.status, InspectionStatus::InProgress);
    assert!(started.started_at.is_some());
    assert!(started.location.is_some());

    h.inspections
        .attach_photo(inspection.id, kitchen_photo(), &inspector())
        .await
        .unwrap();

    let completed = h
        .inspections
        .complete(
            inspection.id,
            verdict(Decision::Approved, "Segregated storage, certified suppliers"),
            &inspector(),
        )
        .await
        .unwrap();

    assert_eq!(completed.inspection.status, InspectionStatus::Completed);
    assert_eq!(completed.inspection.decision, Some(Decision::Approved));
    assert!(completed.inspection.completed_at.is_some());
    assert!(completed.inspection.signed_at.is_some());
    assert_eq!(completed.application.status, ApplicationStatus::Approved);

    let certificate = completed.certificate.expect("approval issues a certificate");
    assert_eq!(certificate.application_id, application.id);
    assert_eq!(certificate.issued_by, INSPECTOR_ID);

    let details = h.inspections.get(inspection.id).await.unwrap();
    assert_eq!(details.photos.len(), 1);
    assert_eq!(details.photos[0].photo_type, PhotoType::Kitchen);

    let actions: Vec<AuditAction> = h
        .audit
        .history(EntityType::Inspection, inspection.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::InspectionCreated,
            AuditAction::InspectionStarted,
            AuditAction::InspectionPhotoAdded,
            AuditAction::InspectionCompleted,
        ]
    );
}

#[tokio::test]
async fn test_rejected_visit_issues_no_certificate() {
    let h = Harness::new();
    let (application, inspection) = h.scheduled("owner@testcafe.com.au").await;
    h.inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap();

    let completed = h
        .inspections
        .complete(
            inspection.id,
            verdict(Decision::Rejected, "Non-certified gelatine in storage"),
            &inspector(),
        )
        .await
        .unwrap();

    assert_eq!(completed.application.status, ApplicationStatus::Rejected);
    assert!(completed.certificate.is_none());
    assert_eq!(
        completed.application.review_notes.as_deref(),
        Some("Non-certified gelatine in storage")
    );
    assert!(h
        .certificates
        .list_for_application(application.id)
        .await
        .unwrap()
        .is_empty());
    assert!(h.repo.all_certificates().await.is_empty());
}

#[tokio::test]
async fn test_only_assigned_inspector_runs_the_visit() {
    let h = Harness::new();
    let (_, inspection) = h.scheduled("owner@testcafe.com.au").await;
    let stranger = Actor::inspector(OTHER_INSPECTOR_ID);

    let err = h
        .inspections
        .start(inspection.id, &stranger, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Administrators may not start a visit on an inspector's behalf either
    let err = h
        .inspections
        .start(inspection.id, &admin(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    h.inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap();
    let err = h
        .inspections
        .complete(inspection.id, verdict(Decision::Approved, "ok"), &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h
        .inspections
        .attach_photo(inspection.id, kitchen_photo(), &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    h.inspections
        .attach_photo(inspection.id, kitchen_photo(), &admin())
        .await
        .unwrap();

    let current = h.inspections.get(inspection.id).await.unwrap();
    assert_eq!(current.inspection.status, InspectionStatus::InProgress);
}

#[tokio::test]
async fn test_visit_steps_must_follow_order() {
    let h = Harness::new();
    let (_, inspection) = h.scheduled("owner@testcafe.com.au").await;

    let err = h
        .inspections
        .complete(inspection.id, verdict(Decision::Approved, "ok"), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    h.inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap();
    let err = h
        .inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let err = h
        .inspections
        .complete(inspection.id, verdict(Decision::Approved, "   "), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "notes"));
}

#[tokio::test]
async fn test_implausible_location_is_rejected() {
    let h = Harness::new();
    let (_, inspection) = h.scheduled("owner@testcafe.com.au").await;

    let err = h
        .inspections
        .start(
            inspection.id,
            &inspector(),
            Some(GeoPoint::new(123.0, 144.0, Utc::now())),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_failed_issuance_rolls_back_completion() {
    let h = Harness::with_numbers(Arc::new(FixedNumberSource(42)));

    // Takes the only number the source will ever draw
    let (_, taken) = h.approved("first@testcafe.com.au").await;
    assert!(taken.certificate_number.as_str().ends_with("-0042"));

    let (application, inspection) = h.scheduled("second@testcafe.com.au").await;
    h.inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap();

    let err = h
        .inspections
        .complete(inspection.id, verdict(Decision::Approved, "All good"), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CertificateIssuance(_)));

    let current = h.inspections.get(inspection.id).await.unwrap();
    assert_eq!(current.inspection.status, InspectionStatus::InProgress);
    assert_eq!(current.inspection.decision, None);

    let details = h.applications.get(application.id).await.unwrap();
    assert_eq!(details.application.status, ApplicationStatus::UnderReview);
    assert!(details.certificates.is_empty());
    assert_eq!(h.repo.all_certificates().await.len(), 1);
}

#[tokio::test]
async fn test_completing_when_application_already_decided_rolls_back() {
    let h = Harness::new();
    let (application, inspection) = h.scheduled("owner@testcafe.com.au").await;
    h.inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap();
    h.applications
        .transition_status(application.id, ApplicationStatus::Rejected, None, &admin())
        .await
        .unwrap();

    let err = h
        .inspections
        .complete(inspection.id, verdict(Decision::Approved, "ok"), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let current = h.inspections.get(inspection.id).await.unwrap();
    assert_eq!(current.inspection.status, InspectionStatus::InProgress);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_closes_inspection_only() {
    let h = Harness::new();
    let (application, inspection) = h.scheduled("owner@testcafe.com.au").await;

    let err = h
        .inspections
        .cancel(inspection.id, "Owner unavailable", &Actor::inspector(OTHER_INSPECTOR_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let cancelled = h
        .inspections
        .cancel(inspection.id, "Owner unavailable", &admin())
        .await
        .unwrap();
    assert_eq!(cancelled.status, InspectionStatus::Cancelled);

    let err = h
        .inspections
        .attach_photo(inspection.id, kitchen_photo(), &inspector())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let err = h
        .inspections
        .start(inspection.id, &inspector(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let details = h.applications.get(application.id).await.unwrap();
    assert_eq!(details.application.status, ApplicationStatus::UnderReview);

    let last = h
        .audit
        .history(EntityType::Inspection, inspection.id)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(last.action, AuditAction::InspectionCancelled);
    assert_eq!(last.details["reason"], "Owner unavailable");
}

#[tokio::test]
async fn test_cancel_keeps_scheduling_notes() {
    let h = Harness::new();
    let submitted = h.submit("owner@testcafe.com.au").await;
    let inspection = h
        .inspections
        .schedule(
            ScheduleInspectionInput {
                notes: Some("Check the cool room".to_string()),
                ..visit_for(submitted.application.id, INSPECTOR_ID)
            },
            &admin(),
        )
        .await
        .unwrap();

    let cancelled = h
        .inspections
        .cancel(inspection.id, "Store renovating", &inspector())
        .await
        .unwrap();
    assert_eq!(cancelled.status, InspectionStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("Check the cool room"));

    let stored = h.inspections.get(inspection.id).await.unwrap();
    assert_eq!(stored.inspection.notes.as_deref(), Some("Check the cool room"));
}

#[tokio::test]
async fn test_list_for_inspector() {
    let h = Harness::new();
    h.scheduled("one@testcafe.com.au").await;
    h.scheduled("two@testcafe.com.au").await;

    assert_eq!(
        h.inspections
            .list_for_inspector(INSPECTOR_ID)
            .await
            .unwrap()
            .len(),
        2
    );
    assert!(h
        .inspections
        .list_for_inspector(OTHER_INSPECTOR_ID)
        .await
        .unwrap()
        .is_empty());
}
