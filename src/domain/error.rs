//! Domain-level error types for slack-channel-export.
//!
//! All errors are typed with `thiserror`. The variants follow the failure
//! classes of an export run: configuration, transport, API payload,
//! cancellation and local I/O.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration or credential error. Fatal before any network activity.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network failure, non-2xx status or an undecodable response body.
    #[error("HTTP error calling {method}: {message}")]
    Http {
        method: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The API answered with `ok: false`.
    #[error("Slack API error from {method}: {code}")]
    Api { method: String, code: String },

    /// A stop was requested through the cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// A paginated endpoint kept returning cursors past the page ceiling.
    #[error("{method} exceeded {max_pages} pages without exhausting its cursor")]
    PageLimitExceeded { method: String, max_pages: usize },

    /// Invalid or unexpected data.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// CSV reading or writing failed.
    #[error("CSV error: {message}")]
    Csv {
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a transport error for an API method.
    pub fn http(method: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Http {
            method: method.into(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a CSV error with context.
    pub fn csv(message: impl Into<String>, err: csv::Error) -> Self {
        Self::Csv {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Whether another attempt at the same request may succeed.
    ///
    /// Only transport failures qualify. An `ok: false` payload usually means
    /// a permission or auth problem that a retry cannot fix.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Whether this is an API error with the given Slack error code.
    #[must_use]
    pub fn is_api_error(&self, expected: &str) -> bool {
        matches!(self, Self::Api { code, .. } if code == expected)
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
