//! Auth Service
//!
//! Signup, login, logout and session lookup over a [`CredentialStore`] and a
//! [`SessionStore`]. Every operation takes its credentials or token as an
//! argument; nothing here knows about HTTP.
//!
//! # Failure Shape
//!
//! Callers see two authentication failures and no more:
//!
//! - [`AuthError::InvalidCredentials`] for unknown email *or* wrong password
//! - [`AuthError::Unauthenticated`] for a missing, unknown, expired or
//!   orphaned session
//!
//! # Session Rotation
//!
//! Changing a password revokes every session of the user and issues a new
//! one, so a stolen cookie does not survive a password change.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::auth::AuthService;
//!
//! let auth = AuthService::in_memory(&config)?;
//!
//! let (user, session) = auth.signup("alice@example.com", "hunter2")?;
//! let me = auth.current_user(session.unwrap().token.as_str())?;
//!
//! let login = auth.login("alice@example.com", "hunter2")?;
//! auth.logout(login.session.token.as_str());
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::AuthConfig;
use crate::credentials::{normalize_email, CredentialStore, MemoryCredentialStore, User};
use crate::crypto::{fingerprint, token_digest};
use crate::error::{AuthError, ConfigError, CredentialError, Result};
use crate::login::LoginTracker;
use crate::observability::SecurityEvent;
use crate::password::PasswordHasher;
use crate::session::{IssuedSession, MemorySessionStore, SessionFlags, SessionStore};

/// A successful login
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub session: IssuedSession,
}

/// Authentication operations over pluggable stores
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tracker: Option<LoginTracker>,
    session_ttl: Duration,
    flags: SessionFlags,
    auto_login_on_signup: bool,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("session_ttl", &self.session_ttl)
            .field("flags", &self.flags)
            .field("lockout", &self.tracker.is_some())
            .field("auto_login_on_signup", &self.auto_login_on_signup)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Wire the service over existing stores
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            credentials,
            sessions,
            tracker: config.lockout.clone().map(LoginTracker::new),
            session_ttl: config.session_ttl,
            flags: config.cookie.session_flags(),
            auto_login_on_signup: config.auto_login_on_signup,
        }
    }

    /// Build the service over fresh in-memory stores
    pub fn in_memory(config: &AuthConfig) -> std::result::Result<Self, ConfigError> {
        let hasher = PasswordHasher::new(config.hashing)
            .map_err(|e| ConfigError::invalid("hashing", e.0))?;
        let credentials = MemoryCredentialStore::new(config.password_policy.clone(), hasher)
            .map_err(|e| ConfigError::invalid("hashing", e.0))?;

        Ok(Self::new(
            Arc::new(credentials),
            Arc::new(MemorySessionStore::new()),
            config,
        ))
    }

    /// The session store, for sweeping and diagnostics
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// The login tracker, if lockout is enabled
    pub fn login_tracker(&self) -> Option<&LoginTracker> {
        self.tracker.as_ref()
    }

    /// Register a user, then log them in when auto-login is enabled.
    pub fn signup(&self, email: &str, password: &str) -> Result<(User, Option<IssuedSession>)> {
        let user = self.credentials.register(email, password)?;

        crate::security_event!(
            SecurityEvent::UserRegistered,
            user_id = %user.id,
            "User registered"
        );

        let session = if self.auto_login_on_signup {
            Some(self.issue(&user)?)
        } else {
            None
        };

        Ok((user, session))
    }

    /// Verify credentials and issue a session.
    ///
    /// When lockout is enabled (it is opt-in), a locked identifier is refused
    /// with [`AuthError::AccountLocked`] before any password check. The
    /// identifier is the submitted email, known or not.
    pub fn login(&self, email: &str, password: &str) -> Result<Authenticated> {
        let identifier = normalize_email(email);
        let user = self.verify_throttled(&identifier, password, "login")?;
        let session = self.issue(&user)?;

        crate::security_event!(
            SecurityEvent::AuthenticationSuccess,
            user_id = %user.id,
            session_id = %session.session.id,
            "Login successful"
        );

        Ok(Authenticated { user, session })
    }

    /// End a session. Unknown or expired tokens are not an error.
    pub fn logout(&self, token: &str) {
        self.sessions.invalidate(token);

        crate::security_event!(
            SecurityEvent::Logout,
            session_id = %fingerprint(&token_digest(token)),
            "Logout"
        );
    }

    /// The user behind a session token
    pub fn current_user(&self, token: &str) -> Result<User> {
        let session = self.sessions.resolve(token)?;

        match self.credentials.find(&session.user_id) {
            Some(user) => Ok(user),
            None => {
                tracing::warn!(session_id = %session.id, "Session references a missing user");
                self.sessions.invalidate(token);
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// Change the password of the session's user.
    ///
    /// Revokes all of the user's sessions, including the calling one, and
    /// returns a fresh session to replace it. The current-password check
    /// shares the login lockout for the user's email.
    pub fn change_password(&self, token: &str, current: &str, new: &str) -> Result<IssuedSession> {
        let user = self.current_user(token)?;
        self.verify_throttled(&user.email, current, "change_password")?;
        self.credentials.update_password(&user.id, new)?;

        let revoked = self.sessions.invalidate_user(&user.id);
        crate::security_event!(
            SecurityEvent::PasswordChanged,
            user_id = %user.id,
            revoked_sessions = revoked,
            "Password changed"
        );

        self.issue(&user)
    }

    /// Revoke every session of the token's user, returning how many ended
    pub fn logout_all(&self, token: &str) -> Result<usize> {
        let session = self.sessions.resolve(token)?;
        let revoked = self.sessions.invalidate_user(&session.user_id);

        crate::security_event!(
            SecurityEvent::Logout,
            user_id = %session.user_id,
            revoked_sessions = revoked,
            "Logged out everywhere"
        );

        Ok(revoked)
    }

    // Every password check against a stored hash goes through here, so the
    // lockout cannot be sidestepped by another operation.
    fn verify_throttled(&self, identifier: &str, password: &str, action: &'static str) -> Result<User> {
        if let Some(lockout) = self.tracker.as_ref().and_then(|t| t.check_lockout(identifier)) {
            crate::security_event!(
                SecurityEvent::AuthenticationFailure,
                identifier = %identifier,
                action = action,
                reason = "locked_out",
                "Password check refused"
            );
            return Err(AuthError::AccountLocked {
                retry_after_secs: lockout.remaining_secs().max(1),
            });
        }

        match self.credentials.verify(identifier, password) {
            Ok(user) => {
                if let Some(tracker) = &self.tracker {
                    tracker.record_success(identifier);
                }
                Ok(user)
            }
            Err(CredentialError::WrongPassword) => {
                let remaining = self
                    .tracker
                    .as_ref()
                    .map(|t| t.record_failure(identifier).remaining_attempts);

                crate::security_event!(
                    SecurityEvent::AuthenticationFailure,
                    identifier = %identifier,
                    action = action,
                    remaining_attempts = ?remaining,
                    "Password check failed"
                );

                Err(AuthError::InvalidCredentials)
            }
            Err(other) => Err(other.into()),
        }
    }

    fn issue(&self, user: &User) -> Result<IssuedSession> {
        Ok(self.sessions.create(&user.id, self.session_ttl, self.flags)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::UserId;
    use crate::testing::{auth_service_with_clock, test_config, ManualClock};

    fn service() -> (AuthService, ManualClock) {
        let clock = ManualClock::new();
        (auth_service_with_clock(&test_config(), clock.clone()), clock)
    }

    fn signed_up(auth: &AuthService, email: &str) -> (User, String) {
        let (user, session) = auth.signup(email, "hunter2").unwrap();
        (user, session.unwrap().token.into_inner())
    }

    #[test]
    fn test_signup_logs_in() {
        let (auth, _) = service();
        let (user, token) = signed_up(&auth, "alice@example.com");

        assert_eq!(auth.current_user(&token).unwrap(), user);
    }

    #[test]
    fn test_signup_without_auto_login() {
        let config = AuthConfig {
            auto_login_on_signup: false,
            ..test_config()
        };
        let auth = auth_service_with_clock(&config, ManualClock::new());

        let (_, session) = auth.signup("alice@example.com", "hunter2").unwrap();
        assert!(session.is_none());
        assert_eq!(auth.sessions().active_sessions(), 0);
    }

    #[test]
    fn test_signup_errors() {
        let (auth, _) = service();
        signed_up(&auth, "alice@example.com");

        assert_eq!(
            auth.signup("ALICE@example.com", "hunter2").unwrap_err(),
            AuthError::DuplicateEmail
        );
        assert!(matches!(
            auth.signup("bob@example.com", ""),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.signup("bob", "hunter2"),
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let (auth, _) = service();
        signed_up(&auth, "alice@example.com");

        let wrong = auth.login("alice@example.com", "nope-nope").unwrap_err();
        let unknown = auth.login("nobody@example.com", "hunter2").unwrap_err();
        assert_eq!(wrong, AuthError::InvalidCredentials);
        assert_eq!(wrong, unknown);
    }

    #[test]
    fn test_login_issues_distinct_sessions() {
        let (auth, _) = service();
        let (user, first) = signed_up(&auth, "alice@example.com");

        let login = auth.login(" Alice@Example.com ", "hunter2").unwrap();
        assert_eq!(login.user, user);
        assert_ne!(login.session.token.as_str(), first);
        assert_eq!(auth.current_user(login.session.token.as_str()).unwrap(), user);
        assert_eq!(auth.current_user(&first).unwrap(), user);
    }

    #[test]
    fn test_logout() {
        let (auth, _) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");

        auth.logout(&token);
        assert_eq!(auth.current_user(&token).unwrap_err(), AuthError::Unauthenticated);
        auth.logout(&token);
        auth.logout("garbage");
    }

    #[test]
    fn test_expired_session_is_unauthenticated() {
        let (auth, clock) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");

        clock.advance(test_config().session_ttl + Duration::from_secs(1));
        assert_eq!(auth.current_user(&token).unwrap_err(), AuthError::Unauthenticated);
        assert_eq!(auth.current_user("never-issued").unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn test_orphaned_session_is_invalidated() {
        let (auth, _) = service();
        let issued = auth
            .sessions()
            .create(&UserId::new(), Duration::from_secs(60), SessionFlags::default())
            .unwrap();

        assert_eq!(
            auth.current_user(issued.token.as_str()).unwrap_err(),
            AuthError::Unauthenticated
        );
        assert_eq!(auth.sessions().active_sessions(), 0);
    }

    #[test]
    fn test_change_password_rotates_sessions() {
        let (auth, _) = service();
        let (user, token) = signed_up(&auth, "alice@example.com");
        let other_device = auth.login("alice@example.com", "hunter2").unwrap().session;

        let fresh = auth.change_password(&token, "hunter2", "correct horse").unwrap();

        assert_eq!(auth.current_user(&token).unwrap_err(), AuthError::Unauthenticated);
        assert!(auth.current_user(other_device.token.as_str()).is_err());
        assert_eq!(auth.current_user(fresh.token.as_str()).unwrap(), user);

        assert_eq!(
            auth.login("alice@example.com", "hunter2").unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(auth.login("alice@example.com", "correct horse").is_ok());
    }

    #[test]
    fn test_change_password_failures() {
        let (auth, _) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");

        assert_eq!(
            auth.change_password(&token, "wrong-one", "correct horse").unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            auth.change_password(&token, "hunter2", "x"),
            Err(AuthError::InvalidInput(_))
        ));
        assert_eq!(
            auth.change_password("bogus", "hunter2", "correct horse").unwrap_err(),
            AuthError::Unauthenticated
        );
        // failed attempts leave the session alone
        assert!(auth.current_user(&token).is_ok());
    }

    #[test]
    fn test_logout_all() {
        let (auth, _) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");
        auth.login("alice@example.com", "hunter2").unwrap();
        let (_, bob) = signed_up(&auth, "bob@example.com");

        assert_eq!(auth.logout_all(&token).unwrap(), 2);
        assert!(auth.current_user(&token).is_err());
        assert!(auth.current_user(&bob).is_ok());
        assert_eq!(auth.logout_all(&token).unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn test_lockout_after_repeated_failures() {
        let (auth, _) = service();
        signed_up(&auth, "alice@example.com");

        for _ in 0..3 {
            assert_eq!(
                auth.login("alice@example.com", "wrong-pass").unwrap_err(),
                AuthError::InvalidCredentials
            );
        }

        // even the right password is refused while locked
        match auth.login("ALICE@example.com", "hunter2").unwrap_err() {
            AuthError::AccountLocked { retry_after_secs } => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 60);
            }
            other => panic!("expected lockout, got {:?}", other),
        }
    }

    #[test]
    fn test_lockout_applies_to_unknown_emails() {
        let (auth, _) = service();
        for _ in 0..3 {
            auth.login("ghost@example.com", "whatever").unwrap_err();
        }
        assert!(matches!(
            auth.login("ghost@example.com", "whatever"),
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[test]
    fn test_lockout_disabled() {
        let config = AuthConfig {
            lockout: None,
            ..test_config()
        };
        let auth = auth_service_with_clock(&config, ManualClock::new());
        signed_up(&auth, "alice@example.com");

        for _ in 0..10 {
            auth.login("alice@example.com", "wrong-pass").unwrap_err();
        }
        assert!(auth.login("alice@example.com", "hunter2").is_ok());
        assert!(auth.login_tracker().is_none());
    }

    #[test]
    fn test_change_password_respects_lockout() {
        let (auth, _) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");

        for _ in 0..3 {
            auth.login("alice@example.com", "wrong-pass").unwrap_err();
        }

        // a session holder cannot keep guessing through the password change
        for i in 0..5 {
            assert!(matches!(
                auth.change_password(&token, &format!("guess-{}", i), "correct horse"),
                Err(AuthError::AccountLocked { .. })
            ));
        }
        assert!(matches!(
            auth.change_password(&token, "hunter2", "correct horse"),
            Err(AuthError::AccountLocked { .. })
        ));
        assert!(auth.login("alice@example.com", "correct horse").is_err());
    }

    #[test]
    fn test_change_password_failures_count_toward_lockout() {
        let (auth, _) = service();
        let (_, token) = signed_up(&auth, "alice@example.com");

        for _ in 0..3 {
            assert_eq!(
                auth.change_password(&token, "wrong-one", "correct horse").unwrap_err(),
                AuthError::InvalidCredentials
            );
        }
        assert!(matches!(
            auth.login("alice@example.com", "hunter2"),
            Err(AuthError::AccountLocked { .. })
        ));
    }
}
