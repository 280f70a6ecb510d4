//! # Portcullis
//!
//! Cookie-based session authentication for JSON APIs consumed by a frontend
//! hosted on another origin.
//!
//! ## Features
//!
//! - **Credentials**: signup and login over Argon2id password hashes, with
//!   normalized emails and enumeration-resistant failures
//! - **Sessions**: opaque 256-bit tokens, stored by digest, with lazy expiry,
//!   per-user revocation and an optional background sweep
//! - **Origin Policy**: exact-match allow-list, preflight answers, and a
//!   startup refusal of wildcard origins with credentials
//! - **Cookies**: `HttpOnly`, `Secure` and `SameSite` session cookies
//! - **Lockout**: opt-in per-email throttling of failed password checks
//! - **Structured Logging**: security events through `tracing`
//!
//! The core ([`auth`], [`credentials`], [`session`], [`cors`]) takes tokens
//! and credentials as plain arguments. [`http`] and [`layers`] wire it into
//! Axum.
//!
//! ## Quick Start
//!
//! ```ignore
//! use portcullis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     observability::init(ObservabilityConfig::from_env())?;
//!
//!     let config = AuthConfig::from_env()?;
//!     config.validate()?;
//!
//!     let policy = Arc::new(OriginPolicy::from_config(&config)?);
//!     let auth = Arc::new(AuthService::in_memory(&config)?);
//!     let app = router(AppState::new(auth, config.cookie.clone()))
//!         .with_auth_layers(&config, policy);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod cookie;
pub mod cors;
pub mod credentials;
mod crypto;
pub mod error;
pub mod http;
pub mod layers;
pub mod login;
pub mod observability;
mod parse;
pub mod password;
pub mod prelude;
pub mod session;
pub mod testing;

// Re-exports
pub use auth::{AuthService, Authenticated};
pub use config::{AuthConfig, AuthConfigBuilder};
pub use cors::OriginPolicy;
pub use error::{AuthError, ConfigError, CredentialError, SessionError};
pub use layers::SecureAuthRouter;
pub use observability::ObservabilityConfigBuilder;
pub use parse::{parse_bool, parse_duration, parse_size};
