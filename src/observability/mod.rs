//! Observability
//!
//! Structured logging for the auth service. Application code uses plain
//! `tracing` macros and [`security_event!`](crate::security_event) for
//! auditable events; this module only decides where and how they are written.
//!
//! # Usage
//!
//! ```ignore
//! use portcullis::observability::{init, ObservabilityConfig};
//!
//! // From environment variables (LOG_FORMAT, RUST_LOG, TRACING_ENABLED)
//! init(ObservabilityConfig::from_env())?;
//!
//! // Or programmatically
//! let config = ObservabilityConfig::builder()
//!     .log_format(LogFormat::Json)
//!     .log_filter("portcullis=debug,tower_http=info")
//!     .build();
//! init(config)?;
//! ```

mod config;
mod events;
mod providers;

pub use config::{LogFormat, ObservabilityConfig, ObservabilityConfigBuilder};
pub use events::{security_event, SecurityEvent, Severity};

use thiserror::Error;
use tracing::info;

/// Install the global tracing subscriber.
///
/// Call once at startup, before anything logs. A second call fails with
/// [`ObservabilityError::Provider`] because a global subscriber is already set.
pub fn init(config: ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(&config)?;

    info!(
        log_format = ?config.log_format,
        log_filter = %config.log_filter,
        "Observability initialized"
    );

    Ok(())
}

/// Observability initialization errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Invalid configuration (bad filter directive)
    #[error("Observability config error: {0}")]
    Config(String),
    /// Subscriber installation failed
    #[error("Provider error: {0}")]
    Provider(String),
}
