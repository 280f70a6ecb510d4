//! Portcullis Prelude - Common imports for applications
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::prelude::*;
//!
//! let app = router(AppState::new(auth, config.cookie.clone()))
//!     .with_auth_layers(&config, policy);
//! ```

// =============================================================================
// Core Configuration
// =============================================================================

pub use crate::config::{AuthConfig, AuthConfigBuilder};
pub use crate::cookie::{CookieSettings, SameSite};
pub use crate::layers::SecureAuthRouter;

// =============================================================================
// Authentication
// =============================================================================

pub use crate::auth::{AuthService, Authenticated};
pub use crate::credentials::{CredentialStore, MemoryCredentialStore, User, UserId};
pub use crate::password::{HashingParams, PasswordHasher, PasswordPolicy};

// =============================================================================
// Sessions
// =============================================================================

pub use crate::session::{
    spawn_session_sweeper, IssuedSession, MemorySessionStore, Session, SessionFlags, SessionStore,
};

// =============================================================================
// Login Tracking
// =============================================================================

pub use crate::login::{spawn_lockout_sweeper, LockoutPolicy, LoginTracker};

// =============================================================================
// Origin Policy
// =============================================================================

pub use crate::cors::{cors_middleware, OriginPolicy};

// =============================================================================
// HTTP
// =============================================================================

pub use crate::http::{router, AppState};

// =============================================================================
// Observability
// =============================================================================

pub use crate::observability::{self, ObservabilityConfig, SecurityEvent};

// =============================================================================
// Error Handling
// =============================================================================

pub use crate::error::{AuthError, ConfigError};

// =============================================================================
// External Re-exports for Convenience
// =============================================================================

pub use axum::{
    Router,
    routing::{get, post, put, delete},
    extract::{State, Json},
    response::IntoResponse,
    http::StatusCode,
    middleware,
};

pub use tracing::{info, warn, error, debug};

pub use std::sync::Arc;
pub use std::time::Duration;
