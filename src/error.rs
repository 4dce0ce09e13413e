//! Error types for pagewise
//!
//! Failures fall into three groups:
//! - Transport and decode failures surfaced by the HTTP/JSON layer (network,
//!   unexpected status codes, malformed JSON)
//! - Composition misuse: waiting on an absent task, or pulling past the end of
//!   a paginated sequence
//! - Task plumbing: panics captured inside mappers or workers, and promises
//!   dropped before completion
//!
//! Absence ("no value", e.g. a remote 404) is *not* an error. It travels
//! through a [`Task`](crate::Task) as a regular outcome and only becomes
//! [`Error::NoValue`] when a caller insists on a value.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for pagewise operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pagewise
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "page_size")
        key: Option<String>,
    },

    /// No async runtime available to schedule work on
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid request URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error (request body encoding or response decoding)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote answered with a status code the caller did not expect
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, lossily decoded for diagnostics
        body: String,
    },

    /// A value was required but the task completed with absence
    #[error("task completed without a value")]
    NoValue,

    /// `next` was called on a paginated sequence with no elements left
    #[error("no more elements left")]
    Exhausted,

    /// The promise backing a task was dropped before it was completed
    #[error("task was abandoned before completion")]
    Abandoned,

    /// A mapper or a worker panicked while producing the value
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The page containing this element failed to load
    #[error("page starting at index {index} failed: {source}")]
    Page {
        /// Global index of the first element of the failed page
        index: usize,
        /// The failure, shared by every element of the page
        #[source]
        source: Arc<Error>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Builds a [`Error::Config`] for a specific configuration key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Returns true for errors caused by using a task or sequence incorrectly
    /// rather than by the remote side
    pub fn is_misuse(&self) -> bool {
        matches!(self, Error::NoValue | Error::Exhausted)
    }

    /// Returns the HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::Page { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Renders a panic payload as a message
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
