//! Domain-level errors raised by value objects and state tables

use thiserror::Error;

/// Errors produced while validating input or applying a lifecycle rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("{entity} cannot move from {from} to {to}")]
    Transition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl DomainError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
