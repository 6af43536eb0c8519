//! Shared fixtures for integration tests
//!
//! Builds the real lifecycle services over `MemoryRepository` with
//! in-process fakes for email, payment and certificate numbers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use halal_backend::config::CertificateConfig;
use halal_backend::error::{AppError, AppResult};
use halal_backend::external::{EmailMessage, NotificationGateway, PaymentVerification, PaymentVerifier};
use halal_backend::repository::{MemoryRepository, Repository, UserCredentials};
use halal_backend::services::{
    ApplicationLifecycle, AuditRecorder, CertificateIssuer, CertificateNumberSource,
    CertificateRegistry, InspectionLifecycle, Notifier, RandomNumberSource,
    ScheduleInspectionInput, SubmittedApplication,
};
use shared::{
    Actor, Application, BusinessType, Inspection, Role, SubmitApplicationInput, Supplier, User,
};

pub const ADMIN_ID: i64 = 1;
pub const INSPECTOR_ID: i64 = 7;
pub const OTHER_INSPECTOR_ID: i64 = 9;
pub const RETIRED_INSPECTOR_ID: i64 = 11;

pub fn admin() -> Actor {
    Actor::admin(ADMIN_ID)
}

pub fn inspector() -> Actor {
    Actor::inspector(INSPECTOR_ID)
}

fn account(id: i64, username: &str, role: Role, is_active: bool) -> UserCredentials {
    UserCredentials {
        user: User {
            id,
            username: username.to_string(),
            name: username.to_string(),
            email: None,
            role,
            is_active,
            created_at: chrono::Utc::now(),
        },
        password_hash: String::new(),
    }
}

/// Staff accounts every harness starts with
pub fn staff() -> Vec<UserCredentials> {
    vec![
        account(ADMIN_ID, "admin", Role::Admin, true),
        account(INSPECTOR_ID, "inspector7", Role::Inspector, true),
        account(OTHER_INSPECTOR_ID, "inspector9", Role::Inspector, true),
        account(RETIRED_INSPECTOR_ID, "inspector11", Role::Inspector, false),
    ]
}

// ============================================================================
// Fakes
// ============================================================================

/// Captures every message; can be switched to fail
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.subject).collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::dependency("email", "mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Declined,
    Unavailable,
    Hangs,
}

/// Payment provider with a scripted answer
pub struct FakePayments {
    outcome: Mutex<PaymentOutcome>,
    checked: Mutex<Vec<String>>,
}

impl Default for FakePayments {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(PaymentOutcome::Succeeded),
            checked: Mutex::new(Vec::new()),
        }
    }
}

impl FakePayments {
    pub fn set(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentVerifier for FakePayments {
    async fn verify(&self, reference: &str) -> AppResult<PaymentVerification> {
        self.checked.lock().unwrap().push(reference.to_string());
        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            PaymentOutcome::Succeeded => Ok(PaymentVerification { succeeded: true }),
            PaymentOutcome::Declined => Ok(PaymentVerification { succeeded: false }),
            PaymentOutcome::Unavailable => Err(AppError::dependency("payments", "provider down")),
            PaymentOutcome::Hangs => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(PaymentVerification { succeeded: true })
            }
        }
    }
}

/// Always draws the same suffix
pub struct FixedNumberSource(pub u16);

impl CertificateNumberSource for FixedNumberSource {
    fn next_suffix(&self) -> AppResult<u16> {
        Ok(self.0)
    }
}

/// Draws every suffix twice in a row: 0, 0, 1, 1, 2, 2, ...
#[derive(Default)]
pub struct RepeatingNumberSource {
    draws: AtomicU32,
}

impl CertificateNumberSource for RepeatingNumberSource {
    fn next_suffix(&self) -> AppResult<u16> {
        let draw = self.draws.fetch_add(1, Ordering::SeqCst);
        Ok(((draw / 2) % 10_000) as u16)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub repo: MemoryRepository,
    pub applications: ApplicationLifecycle,
    pub inspections: InspectionLifecycle,
    pub certificates: CertificateRegistry,
    pub audit: AuditRecorder,
    pub mailbox: Arc<RecordingGateway>,
    pub payments: Arc<FakePayments>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_numbers(Arc::new(RandomNumberSource))
    }

    pub fn with_numbers(numbers: Arc<dyn CertificateNumberSource>) -> Self {
        let repo = MemoryRepository::with_users(staff());
        let shared_repo: Arc<dyn Repository> = Arc::new(repo.clone());
        let mailbox = Arc::new(RecordingGateway::default());
        let payments = Arc::new(FakePayments::default());

        let notifier = Notifier::new(mailbox.clone(), Duration::from_millis(200));
        let issuer = CertificateIssuer::new(
            &CertificateConfig {
                verification_base_url: "https://halal.example.com/api/v1".to_string(),
                max_number_attempts: 10,
                validity_days: 365,
            },
            numbers,
        );
        let applications = ApplicationLifecycle::new(
            shared_repo.clone(),
            issuer,
            notifier.clone(),
            payments.clone(),
            Duration::from_millis(100),
        );
        let inspections =
            InspectionLifecycle::new(shared_repo.clone(), applications.clone(), notifier.clone());
        let certificates = CertificateRegistry::new(shared_repo.clone(), notifier);

        Self {
            audit: AuditRecorder::new(shared_repo),
            repo,
            applications,
            inspections,
            certificates,
            mailbox,
            payments,
        }
    }

    pub async fn submit(&self, owner_email: &str) -> SubmittedApplication {
        self.applications
            .submit(test_cafe(owner_email), Some("203.0.113.9".to_string()))
            .await
            .unwrap()
    }

    /// Submit and schedule a visit for `INSPECTOR_ID`
    pub async fn scheduled(&self, owner_email: &str) -> (Application, Inspection) {
        let submitted = self.submit(owner_email).await;
        let inspection = self
            .inspections
            .schedule(
                ScheduleInspectionInput {
                    application_id: submitted.application.id,
                    inspector_id: INSPECTOR_ID,
                    visit_date: Some(chrono::Utc::now() + chrono::Duration::days(3)),
                    notes: None,
                },
                &admin(),
            )
            .await
            .unwrap();
        (submitted.application, inspection)
    }

    /// Submit and approve by administrator override
    pub async fn approved(&self, owner_email: &str) -> (Application, shared::Certificate) {
        let submitted = self.submit(owner_email).await;
        let outcome = self
            .applications
            .transition_status(
                submitted.application.id,
                shared::ApplicationStatus::Approved,
                None,
                &admin(),
            )
            .await
            .unwrap();
        let certificate = outcome.certificate.clone().unwrap();
        (outcome.application, certificate)
    }
}

// ============================================================================
// Inputs
// ============================================================================

pub fn test_cafe(owner_email: &str) -> SubmitApplicationInput {
    SubmitApplicationInput {
        business_name: "Test Cafe".to_string(),
        business_type: BusinessType::Cafe,
        street: "12 Lygon Street".to_string(),
        suburb: "Brunswick".to_string(),
        state: "VIC".to_string(),
        postcode: "3056".to_string(),
        abn: "12 345 678 901".to_string(),
        owner_name: "Aisha Rahman".to_string(),
        owner_email: owner_email.to_string(),
        owner_phone: "0412 345 678".to_string(),
        products: vec!["Lamb wraps".to_string(), "Chicken rolls".to_string()],
        suppliers: vec![Supplier {
            name: "Halal Meats Co".to_string(),
            material: "Lamb".to_string(),
            certified: true,
        }],
        employee_count: "6-20".to_string(),
        operating_hours: "Mon-Sat 7am-4pm".to_string(),
        documents: Vec::new(),
        notes: None,
        payment_reference: Some("pay_123".to_string()),
    }
}
