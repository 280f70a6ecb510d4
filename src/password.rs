//! Password Policy and Hashing
//!
//! Two halves of the "hash password → verify password" capability:
//!
//! - [`PasswordPolicy`] decides whether a chosen password is acceptable
//! - [`PasswordHasher`] turns an accepted password into an Argon2id PHC
//!   string and checks candidates against it
//!
//! # Defaults
//!
//! The default policy only enforces length (6..=128). Composition rules are
//! not offered; common-password and email-in-password checks are opt-in.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::password::{PasswordPolicy, PasswordHasher, HashingParams};
//!
//! let policy = PasswordPolicy::builder()
//!     .min_length(10)
//!     .check_common_passwords(true)
//!     .build();
//! policy.validate_with_email("correct horse battery", Some("alice@example.com"))?;
//!
//! let hasher = PasswordHasher::new(HashingParams::default())?;
//! let phc = hasher.hash("correct horse battery")?;
//! assert!(hasher.verify("correct horse battery", &phc));
//! ```

use std::collections::HashSet;

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use thiserror::Error;

// ============================================================================
// Password Policy
// ============================================================================

/// Rules a new password must satisfy
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,

    /// Maximum length in characters
    pub max_length: usize,

    /// Reject passwords from the built-in common list
    pub check_common_passwords: bool,

    /// Reject passwords containing the local part of the email
    pub disallow_email_in_password: bool,

    /// Reject PIN-like passwords
    pub disallow_all_numeric: bool,

    /// Application-specific blocked passwords (stored lowercased)
    pub blocked_passwords: HashSet<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 128,
            check_common_passwords: false,
            disallow_email_in_password: false,
            disallow_all_numeric: false,
            blocked_passwords: HashSet::new(),
        }
    }
}

impl PasswordPolicy {
    /// Create a new builder for custom policy configuration
    pub fn builder() -> PasswordPolicyBuilder {
        PasswordPolicyBuilder::default()
    }

    /// Validate a password against the policy
    pub fn validate(&self, password: &str) -> Result<(), PasswordError> {
        self.validate_with_email(password, None)
    }

    /// Validate a password with the account email as context
    pub fn validate_with_email(&self, password: &str, email: Option<&str>) -> Result<(), PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }

        let len = password.chars().count();
        // An empty password is never acceptable, even with min_length 0
        let min = self.min_length.max(1);
        if len < min {
            return Err(PasswordError::TooShort { min, actual: len });
        }
        if len > self.max_length {
            return Err(PasswordError::TooLong {
                max: self.max_length,
                actual: len,
            });
        }

        if self.disallow_all_numeric && password.chars().all(|c| c.is_ascii_digit()) {
            return Err(PasswordError::AllNumeric);
        }

        let lower = password.to_lowercase();

        if self.disallow_email_in_password {
            if let Some(local) = email.and_then(|e| e.split('@').next()) {
                if local.len() > 2 && lower.contains(&local.to_lowercase()) {
                    return Err(PasswordError::ContainsEmail);
                }
            }
        }

        if self.blocked_passwords.contains(&lower) {
            return Err(PasswordError::Blocked);
        }

        if self.check_common_passwords && is_common_password(&lower) {
            return Err(PasswordError::TooCommon);
        }

        Ok(())
    }
}

/// Builder for PasswordPolicy
#[derive(Debug, Clone, Default)]
pub struct PasswordPolicyBuilder {
    policy: PasswordPolicy,
}

impl PasswordPolicyBuilder {
    /// Set minimum password length
    pub fn min_length(mut self, len: usize) -> Self {
        self.policy.min_length = len;
        self
    }

    /// Set maximum password length
    pub fn max_length(mut self, len: usize) -> Self {
        self.policy.max_length = len;
        self
    }

    /// Enable/disable common password checking
    pub fn check_common_passwords(mut self, check: bool) -> Self {
        self.policy.check_common_passwords = check;
        self
    }

    /// Enable/disable email-in-password check
    pub fn disallow_email_in_password(mut self, disallow: bool) -> Self {
        self.policy.disallow_email_in_password = disallow;
        self
    }

    /// Enable/disable all-numeric password check
    pub fn disallow_all_numeric(mut self, disallow: bool) -> Self {
        self.policy.disallow_all_numeric = disallow;
        self
    }

    /// Add custom blocked passwords
    pub fn block_passwords(mut self, passwords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.policy
            .blocked_passwords
            .extend(passwords.into_iter().map(|p| p.into().to_lowercase()));
        self
    }

    /// Build the policy
    pub fn build(self) -> PasswordPolicy {
        self.policy
    }
}

/// Password validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Password can't be blank")]
    Empty,
    #[error("Password must be at least {min} characters (got {actual})")]
    TooShort { min: usize, actual: usize },
    #[error("Password must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
    #[error("Password is too common")]
    TooCommon,
    #[error("Password cannot contain your email")]
    ContainsEmail,
    #[error("This password is not allowed")]
    Blocked,
    #[error("Password cannot be all numbers")]
    AllNumeric,
}

// ============================================================================
// Hashing
// ============================================================================

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashingParams {
    /// OWASP baseline for Argon2id: 19 MiB, 2 passes, 1 lane
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashingParams {
    /// Cheapest parameters Argon2 accepts. Never use outside tests.
    pub fn fast_for_tests() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Argon2id password hasher
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").field("params", self.argon2.params()).finish()
    }
}

impl PasswordHasher {
    /// Build a hasher, rejecting parameters Argon2 cannot use
    pub fn new(params: HashingParams) -> Result<Self, HashError> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password with a fresh random salt into a PHC string
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| HashError(e.to_string()))
    }

    /// Verify a password against a stored PHC string.
    ///
    /// Parameters come from the PHC string, so hashes made with older
    /// settings keep verifying. A malformed hash never verifies.
    pub fn verify(&self, password: &str, phc: &str) -> bool {
        PasswordHash::new(phc)
            .map(|parsed| self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

/// Hashing failure (invalid parameters or RNG failure)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("password hashing failed: {0}")]
pub struct HashError(pub String);

// ============================================================================
// Common Password List
// ============================================================================

/// Direct match, or a common base of 4+ characters followed only by digits
fn is_common_password(lower: &str) -> bool {
    if COMMON_PASSWORDS.contains(&lower) {
        return true;
    }

    COMMON_PASSWORDS.iter().any(|common| {
        common.len() >= 4
            && lower
                .strip_prefix(common)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
    })
}

static COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789",
    "12345", "1234", "111111", "1234567", "dragon",
    "123123", "baseball", "abc123", "football", "monkey",
    "letmein", "shadow", "master", "666666", "qwertyuiop",
    "123321", "mustang", "1234567890", "michael", "654321",
    "superman", "1qaz2wsx", "7777777", "121212", "000000",
    "qazwsx", "123qwe", "killer", "trustno1", "jordan",
    "zxcvbnm", "asdfgh", "hunter", "buster", "soccer",
    "harley", "batman", "tigger", "sunshine", "iloveyou",
    "charlie", "starwars", "computer", "freedom", "princess",
    "passw0rd", "admin", "root", "welcome", "login",
    "guest", "changeme", "test", "default", "secret",
];
