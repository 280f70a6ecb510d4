//! Security Event Logging
//!
//! Structured audit records for authentication and session activity. Every
//! record carries `security_event`, `category` and `severity` fields so a
//! log pipeline can filter on them without parsing messages.
//!
//! Records never include passwords, hashes or raw session tokens. Sessions
//! are identified by their digest fingerprint.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::observability::SecurityEvent;
//!
//! portcullis::security_event!(
//!     SecurityEvent::AuthenticationSuccess,
//!     user_id = %user.id,
//!     session_id = %session.id,
//!     "User authenticated"
//! );
//! ```

use std::fmt;

/// Auditable events emitted by the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    /// Successful login
    AuthenticationSuccess,
    /// Failed login (unknown email or wrong password, not distinguished)
    AuthenticationFailure,
    /// User logout
    Logout,
    /// Session created
    SessionCreated,
    /// Session expired, invalidated or revoked
    SessionDestroyed,

    // Authorization events
    /// Request refused by the origin gate
    AccessDenied,

    // User management events
    /// New user registered
    UserRegistered,
    /// Password changed
    PasswordChanged,

    // Security events
    /// Identifier locked after repeated failures
    AccountLocked,

    // System events
    /// Server started
    SystemStartup,
    /// Server shut down
    SystemShutdown,
}

impl SecurityEvent {
    /// Get the event category for filtering/grouping
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess
            | Self::AuthenticationFailure
            | Self::Logout
            | Self::SessionCreated
            | Self::SessionDestroyed => "authentication",

            Self::AccessDenied => "authorization",

            Self::UserRegistered | Self::PasswordChanged => "user_management",

            Self::AccountLocked => "security",

            Self::SystemStartup | Self::SystemShutdown => "system",
        }
    }

    /// Get the severity level for the event
    pub fn severity(&self) -> Severity {
        match self {
            // High - security-relevant failures
            Self::AuthenticationFailure | Self::AccessDenied | Self::AccountLocked => Severity::High,

            // Medium - important state changes
            Self::AuthenticationSuccess
            | Self::UserRegistered
            | Self::PasswordChanged
            | Self::SystemStartup => Severity::Medium,

            // Low - routine operations
            Self::Logout | Self::SessionCreated | Self::SessionDestroyed | Self::SystemShutdown => {
                Severity::Low
            }
        }
    }

    /// Get the event name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::Logout => "logout",
            Self::SessionCreated => "session_created",
            Self::SessionDestroyed => "session_destroyed",
            Self::AccessDenied => "access_denied",
            Self::UserRegistered => "user_registered",
            Self::PasswordChanged => "password_changed",
            Self::AccountLocked => "account_locked",
            Self::SystemStartup => "system_startup",
            Self::SystemShutdown => "system_shutdown",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a security event with structured fields.
///
/// The macro adds `security_event`, `category` and `severity` and picks the
/// tracing level from the severity (critical → error, high → warn,
/// medium → info, low → debug).
///
/// # Examples
///
/// ```ignore
/// security_event!(
///     SecurityEvent::AccountLocked,
///     identifier = %email,
///     lockout_duration_secs = 900,
///     "Account locked due to failed login attempts"
/// );
/// ```
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event = $event;
        let severity = event.severity();
        let category = event.category();
        let event_name = event.name();

        match severity {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}

pub use security_event;
