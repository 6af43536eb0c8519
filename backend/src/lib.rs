//! Halal Certification Platform - backend library
//!
//! Lifecycle services for applications, inspections and certificates, the
//! storage interface they run against, and the HTTP surface over them.

use std::{sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;

pub use config::Config;

use crate::error::AppResult;
use crate::external::{
    documents::FsDocumentStore, email::gateway_from_config, payment::verifier_from_config,
    DocumentStore, NotificationGateway, PaymentVerifier, QrRenderer, UrlQrRenderer,
};
use crate::repository::Repository;
use crate::services::{
    ApplicationLifecycle, AuditRecorder, AuthService, CertificateIssuer, CertificateNumberSource,
    CertificateRegistry, InspectionLifecycle, Notifier, RandomNumberSource, TokenIssuer,
};

/// External collaborators the services are wired to
#[derive(Clone)]
pub struct Collaborators {
    pub notifications: Arc<dyn NotificationGateway>,
    pub payments: Arc<dyn PaymentVerifier>,
    pub documents: Arc<dyn DocumentStore>,
    pub qr: Arc<dyn QrRenderer>,
    pub certificate_numbers: Arc<dyn CertificateNumberSource>,
}

impl Collaborators {
    /// Production adapters selected by configuration
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self {
            notifications: Arc::from(gateway_from_config(&config.notifications)?),
            payments: Arc::from(verifier_from_config(&config.payments)?),
            documents: Arc::new(FsDocumentStore::new(
                &config.documents.root_dir,
                config.documents.max_bytes,
            )),
            qr: Arc::new(UrlQrRenderer::new(&config.qr.renderer_url)?),
            certificate_numbers: Arc::new(RandomNumberSource),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn Repository>,
    pub applications: ApplicationLifecycle,
    pub inspections: InspectionLifecycle,
    pub certificates: CertificateRegistry,
    pub audit: AuditRecorder,
    pub auth: AuthService,
    pub documents: Arc<dyn DocumentStore>,
    pub qr: Arc<dyn QrRenderer>,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn Repository>, collaborators: Collaborators) -> Self {
        let notifier = Notifier::new(
            collaborators.notifications,
            Duration::from_millis(config.notifications.timeout_ms),
        );
        let issuer = CertificateIssuer::new(&config.certificates, collaborators.certificate_numbers);
        let applications = ApplicationLifecycle::new(
            repo.clone(),
            issuer,
            notifier.clone(),
            collaborators.payments,
            Duration::from_millis(config.payments.timeout_ms),
        );
        let inspections =
            InspectionLifecycle::new(repo.clone(), applications.clone(), notifier.clone());
        let certificates = CertificateRegistry::new(repo.clone(), notifier);
        let auth = AuthService::new(repo.clone(), TokenIssuer::new(&config.jwt));

        Self {
            config: Arc::new(config),
            audit: AuditRecorder::new(repo.clone()),
            repo,
            applications,
            inspections,
            certificates,
            auth,
            documents: collaborators.documents,
            qr: collaborators.qr,
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Halal Certification Platform API v1"
}
