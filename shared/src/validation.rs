//! Validation utilities for the Halal Certification Platform

use crate::error::DomainError;

// ============================================================================
// Business Identity Validations
// ============================================================================

/// Strip the spaces people habitually type into an ABN ("12 345 678 901")
pub fn normalize_abn(abn: &str) -> String {
    abn.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Validate an Australian Business Number: exactly 11 digits
pub fn validate_abn(abn: &str) -> Result<(), &'static str> {
    let normalized = normalize_abn(abn);
    if normalized.len() != 11 {
        return Err("ABN must be 11 digits");
    }
    if !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err("ABN must be numeric");
    }
    Ok(())
}

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate a contact phone number
/// Accepts: 0412345678, 0412 345 678, +61412345678, (02) 9876 5432
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+');
    if !phone.chars().all(allowed) {
        return Err("Phone number contains invalid characters");
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must contain 8 to 15 digits");
    }
    Ok(())
}

/// Validate a postcode (Australian style, 4 digits)
pub fn validate_postcode(postcode: &str) -> Result<(), &'static str> {
    if postcode.len() == 4 && postcode.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err("Postcode must be 4 digits")
    }
}

/// Validate a password's minimum strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

/// Reject values that are empty once trimmed
pub fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        Err(DomainError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Collapse `validator` derive output into a single domain error
///
/// Fields are visited in name order so the reported field is stable.
pub fn first_validation_error(errors: &validator::ValidationErrors) -> DomainError {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    match fields.first() {
        Some(field) => {
            let message = field_errors[field]
                .first()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", e.code))
                })
                .unwrap_or_else(|| "is invalid".to_string());
            DomainError::invalid(*field, message)
        }
        None => DomainError::invalid("input", "is invalid"),
    }
}
