//! Error handling for the Halal Certification Platform
//!
//! Workflow errors carry enough structure to map onto a transport status.
//! Persistence and internal failures are logged in full and returned as a
//! generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Workflow errors
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Payment not verified: {0}")]
    PaymentNotVerified(String),

    #[error("Certificate already revoked: {0}")]
    AlreadyRevoked(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator failed; `fail_open` records whether the state change
    /// that triggered the call still committed
    #[error("{service} unavailable: {message}")]
    Dependency {
        service: &'static str,
        message: String,
        fail_open: bool,
    },

    #[error("Certificate issuance failed: {0}")]
    CertificateIssuance(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Collaborator failure that aborts the operation
    pub fn dependency(service: &'static str, message: impl Into<String>) -> Self {
        AppError::Dependency {
            service,
            message: message.into(),
            fail_open: false,
        }
    }

    /// Mark a collaborator failure as dropped after the state change committed
    pub fn into_fail_open(self) -> Self {
        match self {
            AppError::Dependency {
                service, message, ..
            } => AppError::Dependency {
                service,
                message,
                fail_open: true,
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } | AppError::InvalidTransition(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PaymentNotVerified(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::AlreadyRevoked(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Dependency { .. } => StatusCode::BAD_GATEWAY,
            AppError::CertificateIssuance(_)
            | AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::PaymentNotVerified(_) => "PAYMENT_NOT_VERIFIED",
            AppError::AlreadyRevoked(_) => "ALREADY_REVOKED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Dependency { .. } => "DEPENDENCY_FAILURE",
            AppError::CertificateIssuance(_) => "CERTIFICATE_ISSUANCE_FAILED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Invalid { field, message } => AppError::Validation { field, message },
            transition @ DomainError::Transition { .. } => {
                AppError::InvalidTransition(transition.to_string())
            }
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, field) = match &self {
            AppError::InvalidCredentials => ("Invalid username or password".to_string(), None),
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            AppError::NotFound(resource) => (format!("{} not found", resource), None),
            AppError::Dependency { service, .. } => {
                (format!("{} is temporarily unavailable", service), None)
            }
            AppError::CertificateIssuance(_) => {
                ("The certificate could not be issued".to_string(), None)
            }
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => ("An internal server error occurred".to_string(), None),
            other => (other.to_string(), None),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound("Application".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidTransition("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::validation("notes", "empty").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal("secret detail".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_errors_convert() {
        let invalid: AppError = DomainError::invalid("abn", "ABN must be 11 digits").into();
        assert!(matches!(invalid, AppError::Validation { ref field, .. } if field == "abn"));

        let transition: AppError = DomainError::Transition {
            entity: "application",
            from: "approved".into(),
            to: "rejected".into(),
        }
        .into();
        assert!(matches!(transition, AppError::InvalidTransition(_)));
    }
}
