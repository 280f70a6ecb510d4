//! Cross-Origin Policy Gate
//!
//! Decides which browser origins may call the API. The allow-list is
//! validated and frozen at startup.
//!
//! Two pieces work together:
//!
//! - [`cors_middleware`] is the gate. It refuses disallowed origins with
//!   `403` before any handler runs, and refuses preflights for methods
//!   outside [`ALLOWED_METHODS`].
//! - [`OriginPolicy::cors_layer`] builds the `tower_http` [`CorsLayer`] that
//!   answers preflights and writes the `Access-Control-*` and `Vary`
//!   headers for requests the gate let through.
//!
//! # Rules
//!
//! - Origins match exactly and case-sensitively. `https://app.example.com`
//!   does not allow `https://app.example.com/`, `http://app.example.com`,
//!   `https://app.example.com:8443` or `https://sub.app.example.com`.
//! - In credentialed mode the response echoes the request origin and sets
//!   `Access-Control-Allow-Credentials: true`. A `*` entry in credentialed
//!   mode is a fatal configuration error, since browsers refuse that
//!   combination and it would otherwise grant every site the user's session.
//! - Requests without an `Origin` header (same-origin navigation, curl,
//!   server-to-server) are not cross-origin and pass through.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::cors::{cors_middleware, OriginPolicy};
//!
//! let policy = Arc::new(OriginPolicy::from_config(&config)?);
//! let app = router
//!     .layer(policy.cors_layer())
//!     .layer(middleware::from_fn(move |req, next| {
//!         cors_middleware(req, next, policy.clone())
//!     }));
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AuthConfig;
use crate::error::{AuthError, ConfigError};
use crate::observability::SecurityEvent;

/// Methods a cross-origin caller may use
pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Request headers a cross-origin caller may send
pub const ALLOWED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::AUTHORIZATION,
    HeaderName::from_static("x-requested-with"),
];

/// How long browsers may cache a preflight answer
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

// ============================================================================
// Origin Policy
// ============================================================================

/// Immutable origin allow-list plus credential mode
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    origins: HashSet<String>,
    any_origin: bool,
    credentialed: bool,
}

impl OriginPolicy {
    /// Validate and freeze an allow-list.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidOrigin`] for an entry that is neither `*` nor a
    ///   bare `http`/`https` origin
    /// - [`ConfigError::MisconfiguredOrigin`] for `*` in credentialed mode
    pub fn new<I, S>(origins: I, credentialed: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = HashSet::new();
        let mut any_origin = false;

        for origin in origins {
            let origin = origin.into();
            if origin == "*" {
                if credentialed {
                    return Err(ConfigError::MisconfiguredOrigin(
                        "wildcard origin cannot be combined with credentialed requests".to_string(),
                    ));
                }
                any_origin = true;
                continue;
            }
            validate_origin(&origin)?;
            set.insert(origin);
        }

        Ok(Self {
            origins: set,
            any_origin,
            credentialed,
        })
    }

    /// Build the policy from `CORS_ALLOWED_ORIGINS` / `CORS_ALLOW_CREDENTIALS`
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        Self::new(config.cors_origins.iter().cloned(), config.cors_allow_credentials)
    }

    /// Whether `origin` may make cross-origin requests
    pub fn check_origin(&self, origin: &str) -> bool {
        self.any_origin || self.origins.contains(origin)
    }

    /// Whether responses must carry `Access-Control-Allow-Credentials`
    pub fn requires_credentialed_policy(&self) -> bool {
        self.credentialed
    }

    /// Answer a CORS preflight.
    ///
    /// Independent of authentication: a preflight never carries cookies.
    pub fn preflight(
        &self,
        origin: &str,
        request_method: &str,
        request_headers: Option<&str>,
    ) -> Result<PreflightResponse, AuthError> {
        if !self.check_origin(origin) {
            return Err(AuthError::OriginNotAllowed);
        }

        let method_allowed = Method::from_bytes(request_method.trim().as_bytes())
            .map(|m| ALLOWED_METHODS.contains(&m))
            .unwrap_or(false);
        if !method_allowed {
            tracing::debug!(origin = %origin, method = %request_method, "Preflight method refused");
            return Err(AuthError::OriginNotAllowed);
        }

        if let Some(requested) = request_headers {
            tracing::trace!(origin = %origin, headers = %requested, "Preflight requested headers");
        }

        Ok(PreflightResponse {
            allow_origin: self.allow_origin_value(origin),
            allow_credentials: self.credentialed,
            allow_methods: ALLOWED_METHODS.to_vec(),
            allow_headers: ALLOWED_HEADERS.to_vec(),
            max_age: PREFLIGHT_MAX_AGE,
        })
    }

    /// The `tower_http` layer answering preflights and writing CORS headers.
    ///
    /// Only decides headers; refusing origins is [`cors_middleware`]'s job,
    /// so this must sit inside the gate.
    pub fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods(ALLOWED_METHODS)
            .allow_headers(ALLOWED_HEADERS)
            .max_age(PREFLIGHT_MAX_AGE)
            .allow_credentials(self.credentialed);

        if self.any_origin {
            layer.allow_origin(AllowOrigin::any())
        } else {
            let origins: Vec<HeaderValue> = self
                .origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
    }

    // Never `*` when credentialed; `new` guarantees a wildcard implies non-credentialed
    fn allow_origin_value(&self, origin: &str) -> String {
        if self.any_origin && !self.credentialed {
            "*".to_string()
        } else {
            origin.to_string()
        }
    }
}

/// `scheme://host[:port]` with scheme `http` or `https` and nothing after
fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidOrigin(origin.to_string());

    let rest = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .ok_or_else(invalid)?;

    if rest.is_empty()
        || rest
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '@') || c.is_whitespace() || c.is_control())
    {
        return Err(invalid());
    }

    let (host, port) = match rest.rsplit_once(':') {
        // bracketed IPv6 without a port
        Some((_, tail)) if tail.ends_with(']') => (rest, None),
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    if let Some(port) = port {
        if port.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }
    }
    Ok(())
}

// ============================================================================
// Preflight
// ============================================================================

/// What a successful preflight grants.
///
/// [`OriginPolicy::cors_layer`] writes the same values as response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightResponse {
    /// Exact request origin (or `*` in non-credentialed wildcard mode)
    pub allow_origin: String,
    pub allow_credentials: bool,
    pub allow_methods: Vec<Method>,
    pub allow_headers: Vec<HeaderName>,
    pub max_age: Duration,
}

// ============================================================================
// Middleware
// ============================================================================

/// Origin gate middleware.
///
/// Runs before routing reaches any handler, so disallowed origins never
/// touch the auth service. Allowed requests continue to the [`CorsLayer`]
/// from [`OriginPolicy::cors_layer`], which answers preflights itself.
pub async fn cors_middleware(req: Request, next: Next, policy: Arc<OriginPolicy>) -> Response {
    let Some(raw_origin) = req.headers().get(header::ORIGIN) else {
        return next.run(req).await;
    };

    let origin = match raw_origin.to_str() {
        Ok(origin) if policy.check_origin(origin) => origin.to_string(),
        other => {
            crate::security_event!(
                SecurityEvent::AccessDenied,
                origin = ?other.ok(),
                method = %req.method(),
                path = %req.uri().path(),
                "Cross-origin request refused"
            );
            return AuthError::OriginNotAllowed.into_response();
        }
    };

    if req.method() == Method::OPTIONS {
        if let Some(request_method) = req.headers().get(header::ACCESS_CONTROL_REQUEST_METHOD) {
            let request_method = request_method.to_str().unwrap_or_default();
            let request_headers = req
                .headers()
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .and_then(|v| v.to_str().ok());

            if let Err(err) = policy.preflight(&origin, request_method, request_headers) {
                return err.into_response();
            }
        }
    }

    next.run(req).await
}
