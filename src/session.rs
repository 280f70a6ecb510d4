//! Session Store
//!
//! Maps opaque session tokens to authenticated user ids with an expiry.
//!
//! # Lifecycle
//!
//! ```text
//! absent ──create──▶ active ──expiry──▶ expired ──resolve/sweep──▶ absent
//!                      └─────invalidate / invalidate_user─────────▶ absent
//! ```
//!
//! Expiry is enforced lazily: [`SessionStore::resolve`] compares against the
//! clock on every call and deletes the record if it has lapsed. A periodic
//! sweep ([`spawn_session_sweeper`]) only reclaims memory; correctness never
//! depends on it.
//!
//! # Storage Note
//!
//! Records are keyed by the SHA-256 digest of the token, never the token.
//! [`MemorySessionStore`] is suitable for single-instance deployments; for
//! several instances implement [`SessionStore`] over shared storage.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::session::{MemorySessionStore, SessionFlags, SessionStore};
//! use std::time::Duration;
//!
//! let store = MemorySessionStore::new();
//! let issued = store.create(&user.id, Duration::from_secs(3600), SessionFlags::default())?;
//! let session = store.resolve(issued.token.as_str())?;
//! assert_eq!(session.user_id, user.id);
//! store.invalidate(issued.token.as_str());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::credentials::UserId;
use crate::crypto::{fingerprint, generate_token, token_digest, TokenDigest};
use crate::error::SessionError;
use crate::observability::SecurityEvent;

// ============================================================================
// Clock
// ============================================================================

/// Source of wall-clock time for expiry checks
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Opaque session token handed to the client
///
/// `Debug` is redacted so tokens do not end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Delivery flags for the credential carrier (cookie)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionFlags {
    /// Not readable from page scripts
    pub http_only: bool,
    /// Only sent over HTTPS
    pub secure: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
        }
    }
}

/// A live session record
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Loggable fingerprint of the token digest
    pub id: String,
    /// Owning user
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub flags: SessionFlags,
}

impl Session {
    /// Expired strictly after `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A newly created session together with its token
///
/// This is the only place the raw token exists server-side.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub session: Session,
}

impl IssuedSession {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.session.expires_at
    }

    pub fn flags(&self) -> SessionFlags {
        self.session.flags
    }
}

// ============================================================================
// Session Store
// ============================================================================

/// Storage contract for sessions
///
/// Implementations must make `create` reject, never overwrite, a digest that
/// is already live, and must make `resolve` delete expired records.
pub trait SessionStore: Send + Sync {
    /// Create a session for `user_id` lasting `ttl`
    fn create(&self, user_id: &UserId, ttl: Duration, flags: SessionFlags) -> Result<IssuedSession, SessionError>;

    /// Resolve a token to its live session
    fn resolve(&self, token: &str) -> Result<Session, SessionError>;

    /// Remove a session. Unknown tokens are not an error.
    fn invalidate(&self, token: &str);

    /// Remove every session of a user, returning how many were live
    fn invalidate_user(&self, user_id: &UserId) -> usize;

    /// Remove expired sessions, returning how many were removed
    fn purge_expired(&self) -> usize;

    /// Number of stored sessions (including not-yet-purged expired ones)
    fn active_sessions(&self) -> usize;
}

/// In-memory session store
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    clock: Arc<dyn Clock>,
    sessions: Arc<RwLock<HashMap<TokenDigest, Session>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Create a store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a session under a caller-chosen token
    pub(crate) fn insert_with_token(
        &self,
        token: String,
        user_id: &UserId,
        ttl: Duration,
        flags: SessionFlags,
    ) -> Result<IssuedSession, SessionError> {
        if ttl.is_zero() {
            return Err(SessionError::InvalidTtl);
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| SessionError::InvalidTtl)?;
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).ok_or(SessionError::InvalidTtl)?;

        let digest = token_digest(&token);
        let session = Session {
            id: fingerprint(&digest),
            user_id: user_id.clone(),
            created_at: now,
            expires_at,
            flags,
        };

        {
            let mut sessions = self.sessions.write();
            match sessions.get(&digest) {
                Some(existing) if !existing.is_expired_at(now) => {
                    tracing::error!(session_id = %session.id, "Session token collision rejected");
                    return Err(SessionError::Collision);
                }
                _ => {
                    sessions.insert(digest, session.clone());
                }
            }
        }

        crate::security_event!(
            SecurityEvent::SessionCreated,
            session_id = %session.id,
            user_id = %session.user_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        Ok(IssuedSession {
            token: SessionToken(token),
            session,
        })
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, user_id: &UserId, ttl: Duration, flags: SessionFlags) -> Result<IssuedSession, SessionError> {
        self.insert_with_token(generate_token(), user_id, ttl, flags)
    }

    fn resolve(&self, token: &str) -> Result<Session, SessionError> {
        let digest = token_digest(token);
        let now = self.clock.now();

        // Read lock on the hot path; upgrade only to delete an expired record
        {
            let sessions = self.sessions.read();
            match sessions.get(&digest) {
                None => return Err(SessionError::NotFound),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write();
        match sessions.get(&digest) {
            None => Err(SessionError::NotFound),
            Some(session) if !session.is_expired_at(now) => Ok(session.clone()),
            Some(_) => {
                if let Some(expired) = sessions.remove(&digest) {
                    log_session_destroyed(&expired, "expired");
                }
                Err(SessionError::Expired)
            }
        }
    }

    fn invalidate(&self, token: &str) {
        let digest = token_digest(token);
        if let Some(session) = self.sessions.write().remove(&digest) {
            log_session_destroyed(&session, "invalidated");
        }
    }

    fn invalidate_user(&self, user_id: &UserId) -> usize {
        let now = self.clock.now();
        let mut removed = Vec::new();
        self.sessions.write().retain(|_, session| {
            if &session.user_id == user_id {
                removed.push(session.clone());
                false
            } else {
                true
            }
        });

        for session in &removed {
            log_session_destroyed(session, "revoked");
        }
        removed.iter().filter(|s| !s.is_expired_at(now)).count()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = sessions.len(), "Purged expired sessions");
        }
        purged
    }

    fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Periodically purge expired sessions on the Tokio runtime.
///
/// The first sweep happens one `interval` after spawning.
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.purge_expired();
        }
    })
}

fn log_session_destroyed(session: &Session, reason: &str) {
    crate::security_event!(
        SecurityEvent::SessionDestroyed,
        session_id = %session.id,
        user_id = %session.user_id,
        reason = %reason,
        "Session destroyed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    fn store_with_clock() -> (MemorySessionStore, ManualClock) {
        let clock = ManualClock::new();
        let store = MemorySessionStore::with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_create_then_resolve() {
        let store = MemorySessionStore::new();
        let user = UserId::new();
        let issued = store
            .create(&user, Duration::from_secs(60), SessionFlags::default())
            .unwrap();

        let session = store.resolve(issued.token.as_str()).unwrap();
        assert_eq!(session.user_id, user);
        assert_eq!(session.id, issued.session.id);
        assert_eq!(issued.token.as_str().len(), crate::crypto::TOKEN_LEN);
    }

    #[test]
    fn test_unknown_token() {
        let store = MemorySessionStore::new();
        assert_eq!(store.resolve("nope").unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn test_expired_session_is_deleted() {
        let (store, clock) = store_with_clock();
        let issued = store
            .create(&UserId::new(), Duration::from_secs(60), SessionFlags::default())
            .unwrap();

        // exactly at expiry is still valid
        clock.advance(Duration::from_secs(60));
        assert!(store.resolve(issued.token.as_str()).is_ok());

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.resolve(issued.token.as_str()).unwrap_err(), SessionError::Expired);
        assert_eq!(store.resolve(issued.token.as_str()).unwrap_err(), SessionError::NotFound);
        assert_eq!(store.active_sessions(), 0);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let store = MemorySessionStore::new();
        let issued = store
            .create(&UserId::new(), Duration::from_secs(60), SessionFlags::default())
            .unwrap();

        store.invalidate(issued.token.as_str());
        store.invalidate(issued.token.as_str());
        store.invalidate("never-issued");
        assert_eq!(store.resolve(issued.token.as_str()).unwrap_err(), SessionError::NotFound);
    }

    #[test]
    fn test_collision_rejected() {
        let store = MemorySessionStore::new();
        let first = UserId::new();
        let second = UserId::new();
        store
            .insert_with_token("fixed".into(), &first, Duration::from_secs(60), SessionFlags::default())
            .unwrap();

        let err = store
            .insert_with_token("fixed".into(), &second, Duration::from_secs(60), SessionFlags::default())
            .unwrap_err();
        assert_eq!(err, SessionError::Collision);
        // original owner kept
        assert_eq!(store.resolve("fixed").unwrap().user_id, first);
    }

    #[test]
    fn test_expired_digest_can_be_reused() {
        let (store, clock) = store_with_clock();
        store
            .insert_with_token("fixed".into(), &UserId::new(), Duration::from_secs(1), SessionFlags::default())
            .unwrap();
        clock.advance(Duration::from_secs(5));

        let user = UserId::new();
        store
            .insert_with_token("fixed".into(), &user, Duration::from_secs(60), SessionFlags::default())
            .unwrap();
        assert_eq!(store.resolve("fixed").unwrap().user_id, user);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let store = MemorySessionStore::new();
        let err = store
            .create(&UserId::new(), Duration::ZERO, SessionFlags::default())
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidTtl);
    }

    #[test]
    fn test_invalidate_user() {
        let store = MemorySessionStore::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let a1 = store.create(&alice, Duration::from_secs(60), SessionFlags::default()).unwrap();
        let a2 = store.create(&alice, Duration::from_secs(60), SessionFlags::default()).unwrap();
        let b1 = store.create(&bob, Duration::from_secs(60), SessionFlags::default()).unwrap();

        assert_eq!(store.invalidate_user(&alice), 2);
        assert!(store.resolve(a1.token.as_str()).is_err());
        assert!(store.resolve(a2.token.as_str()).is_err());
        assert!(store.resolve(b1.token.as_str()).is_ok());
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store_with_clock();
        let user = UserId::new();
        store.create(&user, Duration::from_secs(10), SessionFlags::default()).unwrap();
        let keep = store.create(&user, Duration::from_secs(100), SessionFlags::default()).unwrap();

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.active_sessions(), 1);
        assert!(store.resolve(keep.token.as_str()).is_ok());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("super-secret");
        assert_eq!(format!("{:?}", token), "SessionToken(***)");
    }

    #[tokio::test]
    async fn test_sweeper_purges() {
        let clock = ManualClock::new();
        let store = Arc::new(MemorySessionStore::with_clock(Arc::new(clock.clone())));
        store
            .create(&UserId::new(), Duration::from_secs(1), SessionFlags::default())
            .unwrap();
        clock.advance(Duration::from_secs(2));

        let handle = spawn_session_sweeper(store.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.active_sessions(), 0);
    }
}
