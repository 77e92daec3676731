//! Error types for satchel operations.
//!
//! This module defines the main error type [`SatchelError`] which represents
//! all possible errors that can occur while fetching, rewriting, storing, and
//! delivering pages. The library propagates errors to its callers; logging
//! and exit policy belong to the binaries.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for page archiving operations.
#[derive(Error, Debug)]
pub enum SatchelError {
    /// HTTP request errors from reqwest.
    ///
    /// Wraps network errors, DNS failures, connection issues, and other
    /// HTTP-level problems from the content source and image downloads.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The external parser service returned an unusable response.
    #[error("Parser service error: {0}")]
    Parser(String),

    /// The parser response carried no content for the page.
    #[error("No content returned for {0}")]
    MissingContent(String),

    /// The fetched content matched a configured bad-content pattern
    /// (typically a paywall interstitial).
    #[error("Bad content for {url}: matched {pattern:?}")]
    BadContent { url: String, pattern: String },

    /// Malformed hidden-tag rule file or selector.
    ///
    /// Fatal to the rewrite call: a rule that cannot be parsed is never
    /// guessed at.
    #[error("Hidden-tag rules error: {0}")]
    Rules(String),

    /// Malformed configuration file or value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A page id that is not a lowercase hex digest.
    #[error("Invalid page id {0:?}")]
    InvalidPageId(String),

    /// Page lookup miss in the store.
    #[error("Page {0} not found")]
    PageNotFound(String),

    /// The external document converter failed.
    ///
    /// Exit status 1 (warnings only) is tolerated and never produces this
    /// variant.
    #[error("Document converter exited with status {status:?}")]
    Converter { status: Option<i32> },

    /// SMTP delivery failure.
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// SQLite errors from the page store.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON decoding errors (config, rule files, parser responses).
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding/encoding errors.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Filesystem and subprocess I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for SatchelError.
pub type Result<T> = std::result::Result<T, SatchelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SatchelError::InvalidUrl("not a url".to_string());
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_converter_error() {
        let err = SatchelError::Converter { status: Some(2) };
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_rules_error() {
        let err = SatchelError::Rules("expected element.class in \"a.b.c\"".to_string());
        assert!(err.to_string().contains("element.class"));
    }
}
