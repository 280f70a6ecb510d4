//! Error Taxonomy
//!
//! Authentication failures are deliberately low-information. Callers can
//! tell "bad credentials" from "bad input", but never "unknown email" from
//! "wrong password", nor "never logged in" from "session expired".
//!
//! # Layers
//!
//! - [`CredentialError`] and [`SessionError`] are the stores' own failures.
//!   They carry detail (`WrongPassword`, `Expired`) that must not leave the
//!   process; [`crate::auth::AuthService`] collapses them.
//! - [`AuthError`] is what the HTTP layer sees. It maps to a status code and
//!   renders a generic JSON body.
//! - [`ConfigError`] only happens at startup and is fatal.
//!
//! # Usage
//!
//! ```ignore
//! async fn handler(State(state): State<AppState>) -> Result<Json<User>, AuthError> {
//!     let user = state.auth.current_user(token)?;
//!     Ok(Json(user))
//! }
//! ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// ============================================================================
// Store Errors
// ============================================================================

/// Failures reported by a [`crate::credentials::CredentialStore`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Another account already uses this normalized email
    #[error("email is already registered")]
    DuplicateEmail,

    /// Email or password rejected by validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No user with this id
    #[error("user not found")]
    NotFound,

    /// Unknown email or hash mismatch (never distinguished)
    #[error("wrong password")]
    WrongPassword,

    /// The hasher failed (bad parameters, RNG failure)
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Failures reported by a [`crate::session::SessionStore`]
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Token is not known to the store
    #[error("session not found")]
    NotFound,

    /// Token was known but its expiry has passed; the record is gone now
    #[error("session expired")]
    Expired,

    /// A live session already holds this token
    #[error("session token collision")]
    Collision,

    /// TTL is zero or too large to represent
    #[error("invalid session ttl")]
    InvalidTtl,
}

// ============================================================================
// Startup Errors
// ============================================================================

/// Configuration errors detected at startup
///
/// Every variant is fatal: the process should refuse to serve.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Wildcard origin combined with credentialed requests
    #[error("misconfigured origin policy: {0}")]
    MisconfiguredOrigin(String),

    /// An allow-list entry is not a bare origin
    #[error("invalid origin in allow-list: {0:?}")]
    InvalidOrigin(String),

    /// `SameSite=None` cookies must also be `Secure`
    #[error("SameSite=None session cookies require the Secure flag")]
    InsecureCookie,

    /// Any other out-of-range value
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Auth Errors
// ============================================================================

/// Errors surfaced by [`crate::auth::AuthService`] to the HTTP layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed email or password rejected by policy (422)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Email already registered (409)
    #[error("email is already registered")]
    DuplicateEmail,

    /// Unknown email or wrong password (401)
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Missing, unknown or expired session (401)
    #[error("authentication required")]
    Unauthenticated,

    /// Too many failed password checks for this identifier (429)
    ///
    /// Only produced when a [`crate::login::LockoutPolicy`] is configured,
    /// which is off by default. Without one, `login` fails with
    /// [`AuthError::InvalidCredentials`] alone.
    #[error("too many failed login attempts")]
    AccountLocked { retry_after_secs: u64 },

    /// Request origin is not on the allow-list (403)
    #[error("origin not allowed")]
    OriginNotAllowed,

    /// Anything else; detail is logged, never returned (500)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::AccountLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::OriginNotAllowed => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DuplicateEmail => "duplicate_email",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated => "unauthenticated",
            Self::AccountLocked { .. } => "account_locked",
            Self::OriginNotAllowed => "origin_not_allowed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to the client
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            Self::Internal(detail) => {
                tracing::error!(error_kind = self.code(), details = %detail, "Internal error");
            }
            Self::OriginNotAllowed | Self::AccountLocked { .. } => {
                tracing::warn!(error_kind = self.code(), "Request refused");
            }
            _ => {
                tracing::debug!(error_kind = self.code(), "Client error");
            }
        }
    }
}

impl From<SessionError> for AuthError {
    /// Every session failure reads as "not logged in" to the caller
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound | SessionError::Expired => Self::Unauthenticated,
            SessionError::Collision | SessionError::InvalidTtl => Self::Internal(err.to_string()),
        }
    }
}

impl From<CredentialError> for AuthError {
    /// Unknown email and wrong password both read as bad credentials
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateEmail => Self::DuplicateEmail,
            CredentialError::InvalidInput(msg) => Self::InvalidInput(msg),
            CredentialError::WrongPassword => Self::InvalidCredentials,
            CredentialError::NotFound => Self::Unauthenticated,
            CredentialError::Hashing(msg) => Self::Internal(msg),
        }
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error body
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error code (see [`AuthError::code`])
    pub error: String,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::AccountLocked { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;
