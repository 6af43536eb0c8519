//! Business logic services for the Halal Certification Platform

pub mod application;
pub mod audit;
pub mod auth;
pub mod inspection;
pub mod issuer;
pub mod notification;
pub mod registry;

pub use application::{ApplicationDetails, ApplicationLifecycle, SubmittedApplication, TransitionOutcome};
pub use audit::AuditRecorder;
pub use auth::{AuthService, TokenIssuer};
pub use inspection::{
    AttachPhotoInput, CompleteInspectionInput, CompletedInspection, InspectionDetails,
    InspectionLifecycle, ScheduleInspectionInput,
};
pub use issuer::{CertificateIssuer, CertificateNumberSource, RandomNumberSource};
pub use notification::Notifier;
pub use registry::{CertificateRegistry, CertificateView};
