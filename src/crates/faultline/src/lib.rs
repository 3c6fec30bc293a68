//! Error reporting glue for axum services
//!
//! This crate turns nested errors into something operators and error trackers
//! can use:
//!
//! - `chain` - Unwinds an error into its ordered list of causes
//! - `trace` - Captured call stacks, the `Traced` carrier and frame resolution
//! - `http_error` - `HttpError`, a status-carrying error usable as a response
//! - `render` - The default error page renderer (JSON, HTML, plain text)
//! - `handlers` - Per-status error handler registry
//! - `report` - Sentry reporting for errors and recovered panics
//! - `middleware` - axum middleware wiring rendering and reporting into a router
//! - `config` - Configuration loading from environment variables
//! - `logging` - Structured logging helpers and header scrubbing
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline::prelude::*;
//!
//! async fn show(Path(id): Path<u32>) -> Result<String, HttpError> {
//!     let widget = load_widget(id)
//!         .context("failed to load widget")
//!         .http_status(StatusCode::NOT_FOUND)?;
//!     Ok(widget.name)
//! }
//! ```

pub mod chain;
pub mod config;
pub mod handlers;
pub mod http_error;
pub mod logging;
pub mod middleware;
pub mod render;
pub mod report;
pub mod trace;

use thiserror::Error;

pub use chain::{error_chain, oldest_first, ErrorContext};
pub use handlers::{ErrorHandler, ErrorHandlers};
pub use http_error::{ErrorExtension, HttpError, HttpResultExt};
pub use render::{DisplayRecord, Environment, ErrorRenderer, RenderContext};
pub use report::Reporter;
pub use trace::{StackTrace, StackTracer, TraceBinder, Traced};

/// Boxed error type accepted as a cause throughout the crate
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while rendering error pages or delivering reports
#[derive(Debug, Error)]
pub enum FaultlineError {
    /// Template parsing or rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Building the HTTP response failed
    #[error("Response error: {0}")]
    Response(#[from] axum::http::Error),

    /// The reporting backend rejected or failed a submission
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed Sentry DSN
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for faultline operations
pub type Result<T> = std::result::Result<T, FaultlineError>;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::chain::{error_chain, oldest_first, ErrorContext};
    pub use crate::http_error::{HttpError, HttpResultExt};
    pub use crate::render::{Environment, RequestData, RouteTable};
    pub use crate::report::Reporter;
    pub use crate::trace::Traced;
    pub use axum::http::StatusCode;
}

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = FaultlineError::InvalidDsn("missing project id".to_string());
        assert_eq!(err.to_string(), "Invalid DSN: missing project id");

        let err = FaultlineError::Template("unclosed block".to_string());
        assert_eq!(err.to_string(), "Template error: unclosed block");
    }
}
