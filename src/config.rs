//! Auth service configuration
//!
//! Provides a builder-pattern configuration for sessions, cookies, the
//! origin allow-list and request limits.

use std::time::Duration;

use crate::cookie::{CookieSettings, SameSite};
use crate::error::ConfigError;
use crate::login::LockoutPolicy;
use crate::parse::{parse_bool, parse_duration, parse_size};
use crate::password::{HashingParams, PasswordPolicy};

/// Configuration for the auth service and its HTTP layer.
///
/// # Example
///
/// ```ignore
/// use portcullis::AuthConfig;
///
/// // Load from environment variables
/// let config = AuthConfig::from_env()?;
///
/// // Or build programmatically
/// let config = AuthConfig::builder()
///     .cors_origins(vec!["https://app.example.com"])
///     .session_ttl(Duration::from_secs(24 * 60 * 60))
///     .build();
///
/// // Either way, validate before serving
/// config.validate()?;
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Origins allowed to make cross-origin requests.
    /// Empty = no cross-origin access. Entries must be bare origins
    /// (`https://app.example.com`); `*` is only legal without credentials.
    pub cors_origins: Vec<String>,

    /// Whether cross-origin requests carry cookies
    pub cors_allow_credentials: bool,

    /// Lifetime of a session from creation
    pub session_ttl: Duration,

    /// Session cookie attributes
    pub cookie: CookieSettings,

    /// Rules for new passwords
    pub password_policy: PasswordPolicy,

    /// Argon2id cost parameters
    pub hashing: HashingParams,

    /// Failed-login lockout; `None` (the default) disables throttling
    pub lockout: Option<LockoutPolicy>,

    /// Issue a session immediately after signup
    pub auto_login_on_signup: bool,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    /// Request timeout duration
    pub request_timeout: Duration,

    /// Enable request/response tracing
    pub tracing_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: true,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            cookie: CookieSettings::default(),
            password_policy: PasswordPolicy::default(),
            hashing: HashingParams::default(),
            lockout: None,
            auto_login_on_signup: true,
            max_request_size: 1024 * 1024, // 1MB
            request_timeout: Duration::from_secs(30),
            tracing_enabled: true,
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins (default: empty)
    /// - `CORS_ALLOW_CREDENTIALS`: "true"/"false" (default: "true")
    /// - `SESSION_TTL`: e.g., "30m", "24h", "14d" (default: "24h")
    /// - `SESSION_COOKIE_NAME`: (default: "_portcullis_session")
    /// - `SESSION_COOKIE_DOMAIN`: optional `Domain` attribute
    /// - `SESSION_COOKIE_SECURE`: "true"/"false" (default: "true")
    /// - `SESSION_COOKIE_SAMESITE`: "strict", "lax", "none" (default: "none")
    /// - `PASSWORD_MIN_LENGTH`: characters (default: 6)
    /// - `LOGIN_LOCKOUT_ENABLED`: "true"/"false" (default: "false")
    /// - `SIGNUP_AUTO_LOGIN`: "true"/"false" (default: "true")
    /// - `MAX_REQUEST_SIZE`: e.g., "10MB", "512KB" (default: "1MB")
    /// - `REQUEST_TIMEOUT`: e.g., "30s", "5m" (default: "30s")
    /// - `TRACING_ENABLED`: "true"/"false" (default: "true")
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (used by `from_env` and tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(v) = lookup("CORS_ALLOW_CREDENTIALS") {
            config.cors_allow_credentials = field("CORS_ALLOW_CREDENTIALS", &v, parse_bool)?;
        }
        if let Some(v) = lookup("SESSION_TTL") {
            config.session_ttl = field("SESSION_TTL", &v, parse_duration)?;
        }
        if let Some(v) = lookup("SESSION_COOKIE_NAME") {
            config.cookie.name = v.trim().to_string();
        }
        if let Some(v) = lookup("SESSION_COOKIE_DOMAIN") {
            let v = v.trim();
            config.cookie.domain = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = lookup("SESSION_COOKIE_SECURE") {
            config.cookie.secure = field("SESSION_COOKIE_SECURE", &v, parse_bool)?;
        }
        if let Some(v) = lookup("SESSION_COOKIE_SAMESITE") {
            config.cookie.same_site = field("SESSION_COOKIE_SAMESITE", &v, SameSite::parse)?;
        }
        if let Some(v) = lookup("PASSWORD_MIN_LENGTH") {
            config.password_policy.min_length = field("PASSWORD_MIN_LENGTH", &v, |s| s.trim().parse().ok())?;
        }
        if let Some(v) = lookup("LOGIN_LOCKOUT_ENABLED") {
            config.lockout = field("LOGIN_LOCKOUT_ENABLED", &v, parse_bool)?.then(LockoutPolicy::default);
        }
        if let Some(v) = lookup("SIGNUP_AUTO_LOGIN") {
            config.auto_login_on_signup = field("SIGNUP_AUTO_LOGIN", &v, parse_bool)?;
        }
        if let Some(v) = lookup("MAX_REQUEST_SIZE") {
            config.max_request_size = field("MAX_REQUEST_SIZE", &v, parse_size)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            config.request_timeout = field("REQUEST_TIMEOUT", &v, parse_duration)?;
        }
        if let Some(v) = lookup("TRACING_ENABLED") {
            config.tracing_enabled = field("TRACING_ENABLED", &v, parse_bool)?;
        }

        Ok(config)
    }

    /// Create a new builder for programmatic configuration.
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Check the configuration before serving.
    ///
    /// Origin entries are checked when the [`crate::cors::OriginPolicy`] is
    /// built from this config; this covers everything else plus that build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::cors::OriginPolicy::from_config(self)?;
        self.cookie.validate()?;

        if self.session_ttl.is_zero() {
            return Err(ConfigError::invalid("SESSION_TTL", "must be greater than zero"));
        }
        // every expiry must stay representable, not just the ttl itself
        let representable = chrono::Duration::from_std(self.session_ttl)
            .ok()
            .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            .is_some();
        if !representable {
            return Err(ConfigError::invalid("SESSION_TTL", "too large"));
        }
        if self.password_policy.min_length == 0 {
            return Err(ConfigError::invalid("PASSWORD_MIN_LENGTH", "must be at least 1"));
        }
        if self.password_policy.min_length > self.password_policy.max_length {
            return Err(ConfigError::invalid(
                "PASSWORD_MIN_LENGTH",
                format!("exceeds maximum length {}", self.password_policy.max_length),
            ));
        }
        if self.max_request_size == 0 {
            return Err(ConfigError::invalid("MAX_REQUEST_SIZE", "must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("REQUEST_TIMEOUT", "must be greater than zero"));
        }
        Ok(())
    }
}

fn field<T>(name: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, ConfigError> {
    parse(value).ok_or_else(|| ConfigError::invalid(name, format!("cannot parse {:?}", value)))
}

/// Builder for AuthConfig
#[derive(Debug, Clone, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set CORS allowed origins.
    pub fn cors_origins(mut self, origins: Vec<&str>) -> Self {
        self.config.cors_origins = origins.into_iter().map(String::from).collect();
        self
    }

    /// Allow or forbid credentialed cross-origin requests.
    pub fn cors_allow_credentials(mut self, allow: bool) -> Self {
        self.config.cors_allow_credentials = allow;
        self
    }

    /// Set session lifetime.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    /// Set cookie attributes.
    pub fn cookie(mut self, cookie: CookieSettings) -> Self {
        self.config.cookie = cookie;
        self
    }

    /// Set the password policy.
    pub fn password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.config.password_policy = policy;
        self
    }

    /// Set Argon2id cost parameters.
    pub fn hashing(mut self, params: HashingParams) -> Self {
        self.config.hashing = params;
        self
    }

    /// Set the lockout policy.
    pub fn lockout(mut self, policy: LockoutPolicy) -> Self {
        self.config.lockout = Some(policy);
        self
    }

    /// Issue (or not) a session right after signup.
    pub fn auto_login_on_signup(mut self, enabled: bool) -> Self {
        self.config.auto_login_on_signup = enabled;
        self
    }

    /// Set maximum request body size in bytes.
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.config.max_request_size = size;
        self
    }

    /// Set request timeout duration.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Disable request/response tracing.
    pub fn disable_tracing(mut self) -> Self {
        self.config.tracing_enabled = false;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cors_allow_credentials);
        assert!(config.auto_login_on_signup);
        assert!(config.lockout.is_none());
        assert!(config.cookie.secure);
    }

    #[test]
    fn test_from_lookup() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("CORS_ALLOWED_ORIGINS", "https://app.example.com, http://localhost:3000"),
            ("SESSION_TTL", "14d"),
            ("SESSION_COOKIE_SAMESITE", "lax"),
            ("SESSION_COOKIE_DOMAIN", ""),
            ("PASSWORD_MIN_LENGTH", "10"),
            ("LOGIN_LOCKOUT_ENABLED", "true"),
            ("MAX_REQUEST_SIZE", "64KB"),
        ]))
        .unwrap();

        assert_eq!(
            config.cors_origins,
            vec!["https://app.example.com".to_string(), "http://localhost:3000".to_string()]
        );
        assert_eq!(config.session_ttl, Duration::from_secs(14 * 24 * 3600));
        assert_eq!(config.cookie.same_site, SameSite::Lax);
        assert_eq!(config.cookie.domain, None);
        assert_eq!(config.password_policy.min_length, 10);
        assert_eq!(config.lockout.unwrap().max_attempts, LockoutPolicy::default().max_attempts);
        assert_eq!(config.max_request_size, 64 * 1024);
    }

    #[test]
    fn test_malformed_value_names_field() {
        let err = AuthConfig::from_lookup(lookup(&[("SESSION_TTL", "forever")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "SESSION_TTL"));
    }

    #[test]
    fn test_wildcard_with_credentials_is_fatal() {
        let config = AuthConfig::builder().cors_origins(vec!["*"]).build();
        assert!(matches!(config.validate(), Err(ConfigError::MisconfiguredOrigin(_))));

        let config = AuthConfig::builder()
            .cors_origins(vec!["*"])
            .cors_allow_credentials(false)
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_insecure_same_site_none() {
        let config = AuthConfig::builder()
            .cookie(CookieSettings {
                secure: false,
                ..Default::default()
            })
            .build();
        assert_eq!(config.validate(), Err(ConfigError::InsecureCookie));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = AuthConfig::builder().session_ttl(Duration::ZERO).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_ttl_rejected() {
        // converts to a chrono::Duration, but now + ttl overflows the calendar
        let config = AuthConfig::from_lookup(lookup(&[("SESSION_TTL", "1200000000d")])).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "SESSION_TTL"
        ));

        let config = AuthConfig::builder()
            .session_ttl(Duration::from_secs(3650 * 24 * 3600))
            .build();
        assert!(config.validate().is_ok());
    }
}
