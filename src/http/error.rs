//! Error types exposed by the HTTP transport layer.

use std::io;

use http::StatusCode;
use thiserror::Error;

/// Failure reported by a single send attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The request could not complete but may succeed when repeated
    /// (connection refused, timeout, interrupted body).
    #[error("transient network failure: {message}")]
    Transient {
        /// Detail from the underlying HTTP client.
        message: String,
    },

    /// The request is malformed or the client cannot send it at all.
    #[error("request could not be sent: {message}")]
    Fatal {
        /// Detail from the underlying HTTP client.
        message: String,
    },
}

impl SendError {
    /// Returns true when the failure is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Last cause observed before the transport gave up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LastFailure {
    /// The server answered with a retryable status.
    #[error("server responded with status {0}")]
    Status(StatusCode),

    /// The send itself failed transiently.
    #[error(transparent)]
    Send(SendError),
}

/// Errors surfaced by [`super::RetryingTransport::send`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The caller's token or the pool scope fired.
    #[error("request cancelled")]
    Cancelled,

    /// The request body could not be read into memory for replay.
    #[error("request body could not be buffered for replay: {source}")]
    BodyNotReplayable {
        /// Read failure from the body source.
        #[source]
        source: io::Error,
    },

    /// Every attempt failed with a retryable cause.
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Cause of the final failed attempt.
        #[source]
        source: LastFailure,
    },

    /// The send failed in a way that retrying cannot fix.
    #[error(transparent)]
    Fatal(SendError),
}
