//! Testing Utilities
//!
//! Helpers for testing the auth service and applications built on it.
//!
//! # What This Module Provides
//!
//! - [`ManualClock`] for deterministic session expiry
//! - Response checkers for CORS headers and user enumeration
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::session::MemorySessionStore;
//! use portcullis::testing::ManualClock;
//!
//! let clock = ManualClock::new();
//! let sessions = MemorySessionStore::with_clock(Arc::new(clock.clone()));
//! let issued = sessions.create(&user.id, Duration::from_secs(60), SessionFlags::default())?;
//!
//! clock.advance(Duration::from_secs(61));
//! assert!(sessions.resolve(issued.token.as_str()).is_err());
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::session::Clock;

#[cfg(test)]
use crate::{
    auth::AuthService,
    config::AuthConfig,
    credentials::MemoryCredentialStore,
    login::LockoutPolicy,
    password::{HashingParams, PasswordHasher, PasswordPolicy},
    session::MemorySessionStore,
};

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when told to
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Start at the current wall-clock time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Config for tests: fast hashing, a single allowed origin, small lockout
#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig::builder()
        .cors_origins(vec!["https://app.example.com"])
        .hashing(HashingParams::fast_for_tests())
        .lockout(
            LockoutPolicy::builder()
                .max_attempts(3)
                .lockout_duration(Duration::from_secs(60))
                .build(),
        )
        .build()
}

/// Empty credential store with the default policy and fast hashing
#[cfg(test)]
pub(crate) fn credential_store() -> MemoryCredentialStore {
    let hasher = PasswordHasher::new(HashingParams::fast_for_tests()).expect("test hashing params");
    MemoryCredentialStore::new(PasswordPolicy::default(), hasher).expect("dummy hash")
}

/// Auth service over in-memory stores on a manual clock
#[cfg(test)]
pub(crate) fn auth_service_with_clock(config: &AuthConfig, clock: ManualClock) -> AuthService {
    let hasher = PasswordHasher::new(config.hashing).expect("test hashing params");
    let credentials = MemoryCredentialStore::new(config.password_policy.clone(), hasher).expect("dummy hash");
    let sessions = MemorySessionStore::with_clock(Arc::new(clock));
    AuthService::new(Arc::new(credentials), Arc::new(sessions), config)
}

// ============================================================================
// User Enumeration Testing
// ============================================================================

/// Result of user enumeration check
#[derive(Debug, Clone)]
pub struct UserEnumerationResult {
    /// Whether the responses appear to leak account existence
    pub vulnerable: bool,
    /// Specific issues found
    pub issues: Vec<String>,
}

/// Compare the failure for a known email with the failure for an unknown one.
///
/// Status and body must be identical.
pub fn check_user_enumeration(
    known_user: (u16, &str),
    unknown_user: (u16, &str),
) -> UserEnumerationResult {
    let mut issues = Vec::new();

    if known_user.0 != unknown_user.0 {
        issues.push(format!(
            "Status differs for known ({}) and unknown ({}) users",
            known_user.0, unknown_user.0
        ));
    }
    if known_user.1 != unknown_user.1 {
        issues.push("Different error bodies for known vs unknown users".to_string());
    }

    UserEnumerationResult {
        vulnerable: !issues.is_empty(),
        issues,
    }
}

// ============================================================================
// CORS Testing
// ============================================================================

/// Origins that should be refused by a typical allow-list
pub fn cors_test_origins() -> Vec<&'static str> {
    vec![
        "https://evil.com",
        "null",
        "http://localhost",
        "https://127.0.0.1",
        "https://app.example.com.evil.com",
        "https://app.example.com/",
        "http://app.example.com",
        "https://APP.example.com",
    ]
}

/// Check CORS response headers for issues
///
/// `allowed` is the configured allow-list; an echoed origin outside it means
/// the server reflects arbitrary origins.
pub fn check_cors_headers(
    origin_sent: &str,
    allowed: &[&str],
    access_control_allow_origin: Option<&str>,
    access_control_allow_credentials: Option<&str>,
) -> Vec<CorsIssue> {
    let mut issues = Vec::new();

    if let Some(acao) = access_control_allow_origin {
        if acao == "*" && access_control_allow_credentials == Some("true") {
            issues.push(CorsIssue::WildcardWithCredentials);
        }
        if acao == origin_sent && !allowed.contains(&origin_sent) {
            issues.push(CorsIssue::ReflectsArbitraryOrigin(origin_sent.to_string()));
        }
        if acao == "null" {
            issues.push(CorsIssue::AllowsNullOrigin);
        }
    }

    issues
}

/// CORS security issue
#[derive(Debug, Clone, PartialEq)]
pub enum CorsIssue {
    /// Wildcard origin with credentials enabled
    WildcardWithCredentials,
    /// Reflects an origin outside the allow-list
    ReflectsArbitraryOrigin(String),
    /// Allows null origin
    AllowsNullOrigin,
}

impl std::fmt::Display for CorsIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorsIssue::WildcardWithCredentials => {
                write!(f, "CORS allows wildcard (*) with credentials")
            }
            CorsIssue::ReflectsArbitraryOrigin(origin) => {
                write!(f, "CORS reflects arbitrary origin: {}", origin)
            }
            CorsIssue::AllowsNullOrigin => {
                write!(f, "CORS allows null origin")
            }
        }
    }
}
