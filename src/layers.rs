//! Layer application for the auth router
//!
//! Provides the `SecureAuthRouter` trait that wraps a router with the origin
//! gate and request limits.

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware;
use axum::Router;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AuthConfig;
use crate::cors::{cors_middleware, OriginPolicy};

/// Extension trait for applying the auth layers to an Axum Router.
///
/// # Example
///
/// ```ignore
/// use portcullis::{AuthConfig, OriginPolicy, SecureAuthRouter};
///
/// let config = AuthConfig::from_env()?;
/// let policy = Arc::new(OriginPolicy::from_config(&config)?);
/// let app = portcullis::http::router(state).with_auth_layers(&config, policy);
/// ```
pub trait SecureAuthRouter {
    /// Apply all layers.
    ///
    /// Outermost first:
    /// 1. TraceLayer (logs every request, including refused ones)
    /// 2. Origin gate (403 for disallowed origins and preflight methods)
    /// 3. CorsLayer (answers preflights, writes `Access-Control-*` and `Vary`)
    /// 4. Response headers (`Cache-Control: no-store`, `nosniff`)
    /// 5. Request Body Limit
    /// 6. Timeout (innermost)
    fn with_auth_layers(self, config: &AuthConfig, policy: Arc<OriginPolicy>) -> Self;
}

impl<S> SecureAuthRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth_layers(self, config: &AuthConfig, policy: Arc<OriginPolicy>) -> Self {
        let mut router = self;

        router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ));

        router = router.layer(RequestBodyLimitLayer::new(config.max_request_size));

        // Auth responses carry user data and Set-Cookie; never cache them
        router = router
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ));

        // the gate must wrap the CorsLayer so refused origins never get headers
        router = router.layer(policy.cors_layer());
        router = router.layer(middleware::from_fn(move |req, next| {
            cors_middleware(req, next, policy.clone())
        }));

        if config.tracing_enabled {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }
}
