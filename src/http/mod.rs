//! HTTP plumbing shared by the Bitbucket and Confluence clients.
//!
//! Requests are described by [`ApiRequest`] and handed to an [`HttpSend`]
//! implementation. [`RetryingTransport`] wraps any sender and retries
//! throttled, server-side and network failures using a [`BackoffPolicy`],
//! observing a [`tokio_util::sync::CancellationToken`] at every suspension
//! point.

pub mod backoff;
pub mod error;
pub mod request;
pub mod retry;
pub mod send;

pub use backoff::{BackoffPolicy, JitterSource, NoJitter, SeededJitter};
pub use error::{LastFailure, SendError, TransportError};
pub use request::{ApiRequest, ApiResponse, PreparedRequest, RequestBody};
pub use retry::{DEFAULT_MAX_RETRIES, RetryingTransport, Sleeper, TokioSleeper};
pub use send::{DEFAULT_REQUEST_TIMEOUT, HttpSend, ReqwestSender};

#[cfg(test)]
mod tests;
