//! Request validation shared by every HTTP adapter.
//!
//! These checks run before the core flows and only reject shapes that can
//! never be valid; uniqueness and credential checks belong to the stores.

use crate::ServiceError;

/// Longest accepted email address (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// Upper bound on password bytes, so hashing cost stays bounded.
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Validate an email address. Returns the trimmed email.
///
/// Case is preserved: stored rows are compared byte-for-byte.
pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "email must be 1-{MAX_EMAIL_LEN} characters"
        )));
    }
    if !email.contains('@') {
        return Err(ServiceError::InvalidInput("invalid email address".into()));
    }
    Ok(email.to_string())
}

/// Validate a password.
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.is_empty() {
        return Err(ServiceError::InvalidInput("password must not be empty".into()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "password must be at most {MAX_PASSWORD_LEN} bytes"
        )));
    }
    Ok(())
}

/// Normalize an optional invite code: blank means "not supplied".
///
/// Deliberately looser than the legacy service, which looked a whitespace-only
/// code up verbatim and rejected it. Here surrounding whitespace is trimmed
/// and a blank code falls back to the default code.
pub fn normalize_invite_code(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty())
}
