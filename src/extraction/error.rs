//! Error types for the extraction module.

use thiserror::Error;

/// Errors that can occur during a conversation extraction flow.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No browser is reachable at the configured debugging endpoint.
    ///
    /// This is the only hard stop in the taxonomy: every later step depends
    /// on the session, so the operator must start the browser first. It is
    /// never retried automatically.
    #[error("no browser reachable at {0}")]
    ConnectionUnavailable(String),

    /// A page failed to load within its deadline.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The browser rejected or dropped a protocol command.
    #[error("browser protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    /// HTML parsing error.
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// The markup-to-markdown routine produced no usable output.
    #[error("markdown conversion produced no output for non-empty markup")]
    ConversionFailed,

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Regex error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExtractError {
    /// Whether a batch must stop when this error occurs.
    ///
    /// Everything except a missing browser is handled at the boundary of the
    /// single operation it occurred in and reported as a per-item outcome.
    #[must_use]
    pub const fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::ConnectionUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_browser_is_fatal() {
        assert!(ExtractError::ConnectionUnavailable("127.0.0.1:9222".into()).is_fatal_for_batch());
        assert!(!ExtractError::Navigation("timed out".into()).is_fatal_for_batch());
        assert!(!ExtractError::ConversionFailed.is_fatal_for_batch());
    }

    #[test]
    fn test_display_includes_endpoint() {
        let err = ExtractError::ConnectionUnavailable("http://127.0.0.1:9222".into());
        assert!(err.to_string().contains("9222"));
    }
}
