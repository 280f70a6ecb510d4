//! Login Attempt Tracking
//!
//! Optional lockout after repeated failed logins.
//!
//! Attempts are keyed by the *submitted* normalized email, whether or not an
//! account exists for it. Unknown emails lock exactly like known ones, so the
//! lockout response does not reveal account existence.
//!
//! # Storage Note
//!
//! In-memory tracking suitable for single-instance deployments. Every
//! submitted email gets a record, so run [`spawn_lockout_sweeper`] (or call
//! [`LoginTracker::cleanup`]) to keep the map bounded.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::login::{LoginTracker, LockoutPolicy};
//!
//! let tracker = LoginTracker::new(LockoutPolicy::default());
//!
//! // Check BEFORE attempting auth
//! if let Some(lockout) = tracker.check_lockout(&email) {
//!     return Err(AuthError::AccountLocked { retry_after_secs: lockout.remaining_secs() });
//! }
//!
//! if authenticated {
//!     tracker.record_success(&email);
//! } else {
//!     tracker.record_failure(&email);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::observability::SecurityEvent;

// ============================================================================
// Lockout Policy
// ============================================================================

/// Lockout policy configuration
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Number of failed attempts before lockout
    pub max_attempts: u32,

    /// Time window for counting attempts
    /// Attempts older than this are not counted
    pub attempt_window: Duration,

    /// Duration of lockout after max attempts reached
    pub lockout_duration: Duration,

    /// Whether to use progressive lockout (longer each time)
    pub progressive_lockout: bool,

    /// Maximum lockout duration for progressive lockout
    pub max_lockout_duration: Duration,

    /// Multiplier for progressive lockout
    pub lockout_multiplier: f64,
}

impl Default for LockoutPolicy {
    /// - 5 failed attempts before lockout
    /// - 15 minute lockout duration
    /// - 30 minute attempt window
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::from_secs(30 * 60),
            lockout_duration: Duration::from_secs(15 * 60),
            progressive_lockout: true,
            max_lockout_duration: Duration::from_secs(24 * 60 * 60),
            lockout_multiplier: 2.0,
        }
    }
}

impl LockoutPolicy {
    /// Create a new builder
    pub fn builder() -> LockoutPolicyBuilder {
        LockoutPolicyBuilder::default()
    }

    /// Lockout duration for the n-th lockout (1-based)
    pub fn calculate_lockout_duration(&self, lockout_count: u32) -> Duration {
        if !self.progressive_lockout || lockout_count <= 1 {
            return self.lockout_duration;
        }

        let exponent = i32::try_from(lockout_count - 1).unwrap_or(i32::MAX);
        let secs = self.lockout_duration.as_secs_f64() * self.lockout_multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_lockout_duration)
            .min(self.max_lockout_duration)
    }
}

/// Builder for LockoutPolicy
#[derive(Debug, Clone, Default)]
pub struct LockoutPolicyBuilder {
    policy: LockoutPolicy,
}

impl LockoutPolicyBuilder {
    /// Set maximum failed attempts before lockout
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the time window for counting attempts
    pub fn attempt_window(mut self, duration: Duration) -> Self {
        self.policy.attempt_window = duration;
        self
    }

    /// Set lockout duration
    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.policy.lockout_duration = duration;
        self
    }

    /// Enable/disable progressive lockout
    pub fn progressive_lockout(mut self, enabled: bool) -> Self {
        self.policy.progressive_lockout = enabled;
        self
    }

    /// Set maximum lockout duration
    pub fn max_lockout_duration(mut self, duration: Duration) -> Self {
        self.policy.max_lockout_duration = duration;
        self
    }

    /// Set lockout multiplier for progressive lockout
    pub fn lockout_multiplier(mut self, multiplier: f64) -> Self {
        self.policy.lockout_multiplier = multiplier;
        self
    }

    /// Build the policy
    pub fn build(self) -> LockoutPolicy {
        self.policy
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

/// Failed-attempt history for one identifier
#[derive(Debug, Clone, Default)]
pub struct AttemptRecord {
    /// Recent failed attempt timestamps
    pub failed_attempts: Vec<Instant>,
    /// Number of times this identifier has been locked out
    pub lockout_count: u32,
    /// When the current lockout started (if locked out)
    pub lockout_started: Option<Instant>,
    /// Duration of current lockout
    pub lockout_duration: Duration,
    /// Most recent failed attempt
    pub last_failure: Option<Instant>,
}

impl AttemptRecord {
    /// Count recent failed attempts within the window
    pub fn recent_failures(&self, window: Duration) -> u32 {
        let now = Instant::now();
        self.failed_attempts
            .iter()
            .filter(|&&t| now.duration_since(t) < window)
            .count() as u32
    }

    /// Check if currently locked out
    pub fn is_locked_out(&self) -> bool {
        self.remaining_lockout().is_some()
    }

    /// Get remaining lockout time
    pub fn remaining_lockout(&self) -> Option<Duration> {
        let started = self.lockout_started?;
        self.lockout_duration.checked_sub(started.elapsed()).filter(|d| !d.is_zero())
    }

    fn cleanup(&mut self, window: Duration) {
        let now = Instant::now();
        self.failed_attempts.retain(|&t| now.duration_since(t) < window);
    }

    /// Quiet for longer than `forget_after`: progressive history no longer applies
    fn is_stale(&self, forget_after: Duration) -> bool {
        self.last_failure.map_or(true, |t| t.elapsed() >= forget_after)
    }

    fn start_lockout(&mut self, duration: Duration) {
        self.lockout_started = Some(Instant::now());
        self.lockout_duration = duration;
        self.lockout_count += 1;
        self.failed_attempts.clear();
    }
}

/// Result of recording a failed attempt
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// Number of recent failed attempts
    pub failed_count: u32,
    /// Number of remaining attempts before lockout
    pub remaining_attempts: u32,
    /// Whether the identifier is now locked out
    pub is_locked_out: bool,
    /// Lockout duration if locked out
    pub lockout_duration: Option<Duration>,
}

/// Lockout information returned when checking lockout status
#[derive(Debug, Clone)]
pub struct LockoutInfo {
    /// When the lockout started
    pub started: Instant,
    /// Total lockout duration
    pub duration: Duration,
    /// Number of times locked out
    pub lockout_count: u32,
}

impl LockoutInfo {
    /// Remaining lockout in whole seconds, rounded up so clients never retry early
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self.duration.saturating_sub(self.started.elapsed());
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

// ============================================================================
// Login Tracker
// ============================================================================

/// In-memory login attempt tracker
#[derive(Debug, Clone)]
pub struct LoginTracker {
    policy: LockoutPolicy,
    records: Arc<RwLock<HashMap<String, AttemptRecord>>>,
}

impl LoginTracker {
    /// Create a new login tracker with the given policy
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check if an identifier is locked out
    pub fn check_lockout(&self, identifier: &str) -> Option<LockoutInfo> {
        let records = self.records.read();
        let record = records.get(identifier)?;

        if record.is_locked_out() {
            Some(LockoutInfo {
                started: record.lockout_started?,
                duration: record.lockout_duration,
                lockout_count: record.lockout_count,
            })
        } else {
            None
        }
    }

    /// Record a failed login attempt
    pub fn record_failure(&self, identifier: &str) -> AttemptResult {
        let mut records = self.records.write();
        let record = records.entry(identifier.to_string()).or_default();

        record.cleanup(self.policy.attempt_window);
        if !record.is_locked_out() && record.is_stale(self.policy.max_lockout_duration) {
            record.lockout_count = 0;
        }
        let now = Instant::now();
        record.failed_attempts.push(now);
        record.last_failure = Some(now);

        let failed_count = record.recent_failures(self.policy.attempt_window);
        let remaining_attempts = self.policy.max_attempts.saturating_sub(failed_count);

        let (is_locked_out, lockout_duration) =
            if failed_count >= self.policy.max_attempts && !record.is_locked_out() {
                let duration = self.policy.calculate_lockout_duration(record.lockout_count + 1);
                record.start_lockout(duration);
                log_account_locked(identifier, failed_count, duration);
                (true, Some(duration))
            } else {
                (record.is_locked_out(), record.remaining_lockout())
            };

        AttemptResult {
            failed_count,
            remaining_attempts,
            is_locked_out,
            lockout_duration,
        }
    }

    /// Record a successful login; clears recent failures
    pub fn record_success(&self, identifier: &str) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(identifier) {
            record.failed_attempts.clear();
            // lockout_count is kept for progressive lockout
        }
    }

    /// Drop records with no recent failures and no active lockout.
    ///
    /// Lockout history survives until `max_lockout_duration` has passed
    /// since the last failure. Returns the number of records removed.
    pub fn cleanup(&self) -> usize {
        let window = self.policy.attempt_window;
        let forget_after = self.policy.max_lockout_duration;

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| {
            record.cleanup(window);
            !record.failed_attempts.is_empty()
                || record.is_locked_out()
                || (record.lockout_count > 0 && !record.is_stale(forget_after))
        });
        before - records.len()
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.records.read().len()
    }
}

/// Periodically run [`LoginTracker::cleanup`] on the Tokio runtime.
///
/// The first sweep happens one `interval` after spawning.
pub fn spawn_lockout_sweeper(tracker: LoginTracker, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = tracker.cleanup();
            if removed > 0 {
                tracing::debug!(removed, remaining = tracker.tracked(), "Pruned login attempt records");
            }
        }
    })
}

fn log_account_locked(identifier: &str, failed_count: u32, duration: Duration) {
    crate::security_event!(
        SecurityEvent::AccountLocked,
        identifier = %identifier,
        failed_count = failed_count,
        lockout_duration_secs = duration.as_secs(),
        "Account locked due to failed login attempts"
    );
}
