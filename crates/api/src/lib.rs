//! Shared API types, credential hashing, session lifecycle and SQL builders
//! for gatehouse.
//!
//! Request/response types are always available so that clients can depend on
//! this crate without the server stack. The `backend` feature adds hashing,
//! the store traits, the [`session::SessionManager`], the
//! [`registration::RegistrationFlow`] and the sea-query builders.

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod db;
#[cfg(feature = "backend")]
pub mod memory;
#[cfg(feature = "backend")]
pub mod registration;
#[cfg(feature = "backend")]
pub mod service;
#[cfg(feature = "backend")]
pub mod session;
#[cfg(feature = "backend")]
pub mod store;
#[cfg(all(test, feature = "backend"))]
mod testing;

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE_NAME: &str = "session_id";

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password registration, optionally gated by an invite code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
}

/// Email + password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned on successful login. The session token travels only in the
/// `Set-Cookie` header, never in the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user_id: i64,
    pub email: String,
}

/// Public view of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    pub email: String,
}

/// Returned by `GET /api/auth/me`. `user` is `null` for anonymous callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: Option<UserInfo>,
}

/// Generic success response for operations that don't return data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Returned by `GET /api/health` when both stores answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Service Error ───────────────────────────────────────────────────────────

/// Framework-agnostic service error.
///
/// Validation-shaped variants carry a message safe to show to the caller.
/// Infrastructure variants carry diagnostic detail for logs only; the
/// caller sees [`ServiceError::public_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email already exists")]
    DuplicateEmail,

    #[error("invalid invite code")]
    InvalidInviteCode,

    #[error("{0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInviteCode | Self::InvalidInput(_) => 400,
            Self::InvalidCredentials => 401,
            Self::DuplicateEmail => 409,
            Self::Internal(_) | Self::SessionStore(_) => 500,
            Self::Unavailable(_) => 503,
        }
    }

    /// Message shown to the caller. Never includes store internals.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials | Self::DuplicateEmail | Self::InvalidInviteCode => {
                self.to_string()
            }
            Self::InvalidInput(msg) => msg.clone(),
            Self::Internal(_) => "internal server error".into(),
            Self::SessionStore(_) => "session error".into(),
            Self::Unavailable(_) => "service unavailable".into(),
        }
    }
}

// ─── Error (JSON shape) ─────────────────────────────────────────────────────

/// JSON error shape `{ "error": "..." }` returned by all error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.public_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = ServiceError::Internal("disk I/O error at /var/lib/db".into());
        assert_eq!(ApiError::from(&err).error, "internal server error");
        assert_eq!(err.status_code(), 500);

        let err = ServiceError::SessionStore("connection refused".into());
        assert_eq!(ApiError::from(&err).error, "session error");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn validation_errors_are_distinct() {
        assert_eq!(ServiceError::DuplicateEmail.status_code(), 409);
        assert_eq!(ServiceError::InvalidInviteCode.status_code(), 400);
        assert_eq!(ServiceError::InvalidCredentials.status_code(), 401);
        assert_eq!(
            ServiceError::InvalidCredentials.public_message(),
            "invalid email or password"
        );
    }

    #[test]
    fn register_request_invite_code_is_optional() {
        let req: RegisterRequest =
            serde_json::from_str(r#"{"email":"a@b.c","password":"pw"}"#).unwrap();
        assert!(req.invite_code.is_none());

        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("invite_code").is_none());
    }

    #[test]
    fn anonymous_me_serializes_null_user() {
        let body = serde_json::to_value(MeResponse { user: None }).unwrap();
        assert_eq!(body, serde_json::json!({ "user": null }));
    }
}
