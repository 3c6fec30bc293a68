//! Causal chain extraction
//!
//! Unwinds an error into the sequence of errors that caused it by following
//! `source()`. The chain is discovered outermost first; [`oldest_first`]
//! gives the presentation order used by error pages and reports.
//!
//! Chains must be finite. No cycle detection is performed: an error whose
//! `source()` eventually returns itself will loop forever.
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline::chain::{oldest_first, ErrorContext};
//!
//! let err = std::fs::read_to_string("settings.toml")
//!     .context("failed to load settings")
//!     .unwrap_err();
//!
//! let causes: Vec<String> = oldest_first(&err).iter().map(|e| e.to_string()).collect();
//! assert_eq!(causes.last().unwrap(), "failed to load settings");
//! ```

use std::error::Error as StdError;

use crate::trace::Traced;

/// Walk the cause relation of `error`, outermost error first.
///
/// The result always contains `error` itself. Each following element is the
/// `source()` of the one before it, and the last element has no source.
pub fn error_chain<'a>(error: &'a (dyn StdError + 'static)) -> Vec<&'a (dyn StdError + 'static)> {
    let mut chain = vec![error];
    let mut current = error;

    while let Some(cause) = current.source() {
        chain.push(cause);
        current = cause;
    }

    chain
}

/// The causal chain of `error` with the root cause first.
pub fn oldest_first<'a>(error: &'a (dyn StdError + 'static)) -> Vec<&'a (dyn StdError + 'static)> {
    let mut chain = error_chain(error);
    chain.reverse();
    chain
}

/// Get the root cause of an error chain
pub fn root_cause<'a>(error: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

/// Count the number of errors in an error chain (minimum 1)
pub fn error_chain_length(error: &(dyn StdError + 'static)) -> usize {
    error_chain(error).len()
}

/// Format an error chain as a multi-line string
///
/// The outermost error comes first, each cause indented one level deeper.
pub fn format_error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut result = format!("Error: {}", error);

    for (level, cause) in error_chain(error).into_iter().enumerate().skip(1) {
        result.push_str(&format!("\n{:indent$}Caused by: {}", "", cause, indent = level * 2));
    }

    result
}

/// Trait for wrapping errors with a message and a captured call stack
///
/// The wrapped error becomes the `source()` of a [`Traced`], so it shows up
/// as its own entry in the causal chain.
pub trait ErrorContext<T> {
    /// Wrap the error with a message
    fn context(self, msg: impl Into<String>) -> Result<T, Traced>;

    /// Wrap the error with a lazily built message
    fn with_context<F>(self, f: F) -> Result<T, Traced>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> Result<T, Traced> {
        self.map_err(|e| Traced::wrap(e, msg))
    }

    fn with_context<F>(self, f: F) -> Result<T, Traced>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Traced::wrap(e, f()))
    }
}
