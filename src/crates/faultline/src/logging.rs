//! Logging helpers
//!
//! Structured logging of error chains with tracing, and scrubbing of
//! sensitive request headers before they leave the process.

use std::error::Error as StdError;

use regex::Regex;
use tracing::error;

use crate::chain::error_chain;

/// Header names that are always treated as sensitive
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

/// Header names mentioning credentials
const SENSITIVE_PATTERN: &str = r"(?i)(token|secret|passw(or)?d|api[-_]?key|session)";

/// Log an error and each of its causes at error level
///
/// The error itself is logged with the full chain length; each cause follows
/// with its depth so log aggregators can reassemble the chain.
pub fn log_error_chain(err: &(dyn StdError + 'static)) {
    let chain = error_chain(err);
    error!(error = %err, causes = chain.len() - 1, "request failed");

    for (depth, cause) in chain.iter().enumerate().skip(1) {
        error!(depth, cause = %cause, "caused by");
    }
}

/// Drops sensitive headers from request metadata
#[derive(Debug, Clone)]
pub struct HeaderScrubber {
    pattern: Option<Regex>,
    extra: Vec<String>,
}

impl HeaderScrubber {
    /// Scrubber for the built-in list of sensitive headers
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(SENSITIVE_PATTERN).ok(),
            extra: Vec::new(),
        }
    }

    /// Also drop the header called `name`
    pub fn with_header(mut self, name: impl Into<String>) -> Self {
        self.extra.push(name.into().to_ascii_lowercase());
        self
    }

    /// Whether a header must not be reported
    pub fn is_sensitive(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        SENSITIVE_HEADERS.contains(&lower.as_str())
            || self.extra.iter().any(|h| *h == lower)
            || self.pattern.as_ref().is_some_and(|re| re.is_match(&lower))
    }

    /// Headers with the sensitive ones removed
    pub fn scrub(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        headers
            .iter()
            .filter(|(name, _)| !self.is_sensitive(name))
            .cloned()
            .collect()
    }
}

impl Default for HeaderScrubber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Traced;

    fn headers(names: &[&str]) -> Vec<(String, String)> {
        names
            .iter()
            .map(|n| (n.to_string(), "value".to_string()))
            .collect()
    }

    #[test]
    fn test_builtin_sensitive_headers() {
        let scrubber = HeaderScrubber::new();

        assert!(scrubber.is_sensitive("Authorization"));
        assert!(scrubber.is_sensitive("cookie"));
        assert!(scrubber.is_sensitive("Proxy-Authorization"));
        assert!(!scrubber.is_sensitive("Accept"));
    }

    #[test]
    fn test_pattern_sensitive_headers() {
        let scrubber = HeaderScrubber::new();

        assert!(scrubber.is_sensitive("X-Api-Key"));
        assert!(scrubber.is_sensitive("X-CSRF-Token"));
        assert!(scrubber.is_sensitive("X-Client-Secret"));
        assert!(!scrubber.is_sensitive("User-Agent"));
    }

    #[test]
    fn test_extra_header() {
        let scrubber = HeaderScrubber::new().with_header("X-Internal-Tenant");

        assert!(scrubber.is_sensitive("x-internal-tenant"));
    }

    #[test]
    fn test_scrub_preserves_order() {
        let scrubber = HeaderScrubber::new();
        let scrubbed = scrubber.scrub(&headers(&["host", "authorization", "accept", "cookie"]));

        let names: Vec<&str> = scrubbed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["host", "accept"]);
    }

    #[test]
    fn test_log_error_chain() {
        let err = Traced::wrap(Traced::msg("inner"), "outer");
        log_error_chain(&err);
    }
}
