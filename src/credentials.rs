//! Credential Store
//!
//! User records keyed by normalized email, with Argon2id password hashes.
//!
//! The public [`User`] type carries no hash. Hashes live in a private record
//! inside the store and never leave it, so nothing that serializes a `User`
//! can leak one.
//!
//! # Enumeration Resistance
//!
//! [`CredentialStore::verify`] fails with the same error for an unknown email
//! and for a wrong password. For unknown emails it still runs a full Argon2
//! verification against a dummy hash, so both paths cost the same.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::credentials::{CredentialStore, MemoryCredentialStore};
//! use portcullis::password::{HashingParams, PasswordHasher, PasswordPolicy};
//!
//! let hasher = PasswordHasher::new(HashingParams::default())?;
//! let store = MemoryCredentialStore::new(PasswordPolicy::default(), hasher)?;
//!
//! let user = store.register("Alice@Example.com", "hunter2")?;
//! assert_eq!(user.email, "alice@example.com");
//! let same = store.verify("alice@example.com", "hunter2")?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::generate_token;
use crate::error::CredentialError;
use crate::password::{HashError, PasswordHasher, PasswordPolicy};

/// Maximum length of the local part of an email
const MAX_LOCAL_LEN: usize = 64;
/// Maximum length of the domain part of an email
const MAX_DOMAIN_LEN: usize = 255;

// ============================================================================
// User
// ============================================================================

/// Opaque, stable user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// A fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered user, safe to serialize into responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Normalized (trimmed, lowercased) email
    pub email: String,
    pub created_at: DateTime<Utc>,
}

struct UserRecord {
    user: User,
    password_hash: String,
}

// ============================================================================
// Email Rules
// ============================================================================

/// Trim and lowercase an email for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Structural email check on an already-normalized address
///
/// - exactly one `@`
/// - local part: non-empty, at most 64 bytes, no leading/trailing/double dots
/// - domain: non-empty, at most 255 bytes, contains a dot, alphanumerics,
///   dots and hyphens only
/// - no whitespace anywhere
pub fn validate_email(email: &str) -> Result<(), CredentialError> {
    let invalid = |msg: &str| Err(CredentialError::InvalidInput(msg.to_string()));

    if email.is_empty() {
        return invalid("email can't be blank");
    }
    if email.chars().any(char::is_whitespace) {
        return invalid("email must not contain whitespace");
    }

    let Some((local, domain)) = email.split_once('@') else {
        return invalid("email is invalid");
    };
    if domain.contains('@') {
        return invalid("email is invalid");
    }

    if local.is_empty()
        || local.len() > MAX_LOCAL_LEN
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
    {
        return invalid("email local part is invalid");
    }

    if domain.is_empty()
        || domain.len() > MAX_DOMAIN_LEN
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
        || !domain.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return invalid("email domain is invalid");
    }

    Ok(())
}

// ============================================================================
// Credential Store
// ============================================================================

/// Storage contract for user credentials
pub trait CredentialStore: Send + Sync {
    /// Create a user. Email uniqueness is case-insensitive.
    fn register(&self, email: &str, password: &str) -> Result<User, CredentialError>;

    /// Check a password. Unknown email and mismatch both yield `WrongPassword`.
    fn verify(&self, email: &str, password: &str) -> Result<User, CredentialError>;

    /// Look up a user by id
    fn find(&self, id: &UserId) -> Option<User>;

    /// Replace a user's password hash after validating the new password
    fn update_password(&self, id: &UserId, new_password: &str) -> Result<(), CredentialError>;
}

/// In-memory credential store
#[derive(Clone)]
pub struct MemoryCredentialStore {
    policy: PasswordPolicy,
    hasher: PasswordHasher,
    dummy_hash: Arc<str>,
    inner: Arc<RwLock<Users>>,
}

#[derive(Default)]
struct Users {
    by_id: HashMap<UserId, UserRecord>,
    by_email: HashMap<String, UserId>,
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("policy", &self.policy)
            .field("hasher", &self.hasher)
            .field("users", &self.inner.read().by_id.len())
            .finish()
    }
}

impl MemoryCredentialStore {
    /// Create an empty store.
    ///
    /// Computes the dummy hash used for unknown-email verification, so this
    /// fails if the hasher cannot hash.
    pub fn new(policy: PasswordPolicy, hasher: PasswordHasher) -> Result<Self, HashError> {
        let dummy_hash = hasher.hash(&generate_token())?;
        Ok(Self {
            policy,
            hasher,
            dummy_hash: Arc::from(dummy_hash),
            inner: Arc::new(RwLock::new(Users::default())),
        })
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_password(&self, password: &str, email: &str) -> Result<(), CredentialError> {
        self.policy
            .validate_with_email(password, Some(email))
            .map_err(|e| CredentialError::InvalidInput(e.to_string()))
    }

    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        self.hasher
            .hash(password)
            .map_err(|e| CredentialError::Hashing(e.0))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn register(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.check_password(password, &email)?;

        // Fail fast on an obvious duplicate before paying for a hash
        if self.inner.read().by_email.contains_key(&email) {
            return Err(CredentialError::DuplicateEmail);
        }

        let password_hash = self.hash(password)?;
        let user = User {
            id: UserId::new(),
            email,
            created_at: Utc::now(),
        };

        let mut users = self.inner.write();
        if users.by_email.contains_key(&user.email) {
            return Err(CredentialError::DuplicateEmail);
        }
        users.by_email.insert(user.email.clone(), user.id.clone());
        users.by_id.insert(
            user.id.clone(),
            UserRecord {
                user: user.clone(),
                password_hash,
            },
        );

        Ok(user)
    }

    fn verify(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let email = normalize_email(email);

        let found = {
            let users = self.inner.read();
            users
                .by_email
                .get(&email)
                .and_then(|id| users.by_id.get(id))
                .map(|record| (record.user.clone(), record.password_hash.clone()))
        };

        match found {
            Some((user, hash)) if self.hasher.verify(password, &hash) => Ok(user),
            Some(_) => Err(CredentialError::WrongPassword),
            None => {
                let _ = self.hasher.verify(password, &self.dummy_hash);
                Err(CredentialError::WrongPassword)
            }
        }
    }

    fn find(&self, id: &UserId) -> Option<User> {
        self.inner.read().by_id.get(id).map(|record| record.user.clone())
    }

    fn update_password(&self, id: &UserId, new_password: &str) -> Result<(), CredentialError> {
        let email = self.find(id).ok_or(CredentialError::NotFound)?.email;
        self.check_password(new_password, &email)?;
        let password_hash = self.hash(new_password)?;

        let mut users = self.inner.write();
        let record = users.by_id.get_mut(id).ok_or(CredentialError::NotFound)?;
        record.password_hash = password_hash;
        Ok(())
    }
}
