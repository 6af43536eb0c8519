//! Route definitions for the Halal Certification Platform

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
///
/// Public routes come first; everything merged from `protected_routes` sits
/// behind the bearer-token middleware.
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .route("/auth/login", post(handlers::auth::login))
        // Public verification (QR code scanning)
        .route(
            "/verify/:number",
            get(handlers::certificates::verify_certificate),
        )
        .route(
            "/certificates/search",
            get(handlers::certificates::search_certificates),
        )
        // Application submission (public); listing needs a token
        .route(
            "/applications",
            post(handlers::applications::submit_application).merge(
                get(handlers::applications::list_applications).route_layer(
                    middleware::from_fn_with_state(state.clone(), auth_middleware),
                ),
            ),
        )
        .merge(protected_routes(state))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/applications", application_routes())
        .nest("/inspections", inspection_routes())
        .nest("/certificates", certificate_routes())
        .nest("/audit", audit_routes())
        .nest("/documents", document_routes())
        .nest("/users", user_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Application routes (protected)
fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(handlers::applications::get_application))
        .route(
            "/:id/status",
            post(handlers::applications::transition_application),
        )
        .route(
            "/:id/inspections",
            get(handlers::inspections::application_inspections),
        )
        .route(
            "/:id/certificates",
            get(handlers::certificates::application_certificates),
        )
}

/// Inspection routes (protected)
fn inspection_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::inspections::schedule_inspection))
        .route("/mine", get(handlers::inspections::my_inspections))
        .route("/:id", get(handlers::inspections::get_inspection))
        .route("/:id/start", post(handlers::inspections::start_inspection))
        .route("/:id/photos", post(handlers::inspections::attach_photo))
        .route(
            "/:id/complete",
            post(handlers::inspections::complete_inspection),
        )
        .route("/:id/cancel", post(handlers::inspections::cancel_inspection))
}

/// Certificate routes (protected)
fn certificate_routes() -> Router<AppState> {
    Router::new()
        .route("/expire", post(handlers::certificates::expire_certificates))
        .route("/:id", get(handlers::certificates::get_certificate))
        .route(
            "/:id/revoke",
            post(handlers::certificates::revoke_certificate),
        )
}

/// Audit log routes (admin)
fn audit_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:entity_type/:entity_id",
            get(handlers::audit::entity_history),
        )
        .route(
            "/:entity_type/:entity_id/export",
            get(handlers::audit::export_history),
        )
}

/// Document routes (protected)
fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::documents::upload_document))
        .route("/:id", get(handlers::documents::download_document))
}

/// Staff account routes
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::users::create_user))
        .route("/me", get(handlers::users::me))
}
