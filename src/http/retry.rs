//! Retry loop wrapped around an [`HttpSend`] implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backoff::{BackoffPolicy, JitterSource, SeededJitter, additive_jitter};
use super::error::{LastFailure, TransportError};
use super::request::{ApiRequest, ApiResponse};
use super::send::HttpSend;

/// Retries after the first attempt before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Transport that retries throttled, server-side and transient failures.
///
/// Client errors other than `429 Too Many Requests` are returned to the
/// caller untouched so that classification happens one layer up.
pub struct RetryingTransport<S> {
    sender: S,
    policy: BackoffPolicy,
    max_retries: u32,
    jitter: Arc<dyn JitterSource>,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: HttpSend> RetryingTransport<S> {
    /// Wraps `sender` with the default policy and retry budget.
    #[must_use]
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            policy: BackoffPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            jitter: Arc::new(SeededJitter::from_entropy()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the backoff policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sends `request`, retrying until it succeeds, fails terminally, the
    /// retry budget runs out, or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`TransportError::BodyNotReplayable`] when the body cannot be
    ///   buffered; nothing is sent.
    /// - [`TransportError::Cancelled`] as soon as `cancel` fires.
    /// - [`TransportError::Fatal`] for a non-transient send failure.
    /// - [`TransportError::Exhausted`] when every attempt failed with a
    ///   retryable cause.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let prepared = request
            .into_prepared()
            .map_err(|source| TransportError::BodyNotReplayable { source })?;

        let mut retries: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let attempt = retries.saturating_add(1);
            debug!(method = %prepared.method, url = %prepared.url, attempt, "sending request");

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                outcome = self.sender.send(prepared.clone()) => outcome,
            };

            let (failure, server_delay) = match outcome {
                Ok(response) if is_retryable_status(response.status) => {
                    let hint = retry_after(&response.headers, Utc::now());
                    (LastFailure::Status(response.status), hint)
                }
                Ok(response) => return Ok(response),
                Err(error) if error.is_transient() => (LastFailure::Send(error), None),
                Err(error) => return Err(TransportError::Fatal(error)),
            };

            if retries >= self.max_retries {
                return Err(TransportError::Exhausted {
                    attempts: attempt,
                    source: failure,
                });
            }

            let delay = server_delay.map_or_else(
                || self.policy.next(retries, self.jitter.as_ref()),
                |hinted| additive_jitter(hinted, self.jitter.as_ref()),
            );
            warn!(
                url = %prepared.url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                cause = %failure,
                "retrying request"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                () = self.sleeper.sleep(delay) => {}
            }
            retries = attempt;
        }
    }
}

/// Returns true for `429` and the `5xx` range up to `511`.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || (500..=511).contains(&status.as_u16())
}

/// Parses `Retry-After` as delta-seconds or an HTTP-date.
///
/// Zero, past, or unparseable values yield `None` so the caller falls back
/// to its backoff policy.
pub(crate) fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return (seconds > 0).then(|| Duration::from_secs(seconds));
    }
    let until = DateTime::parse_from_rfc2822(raw).ok()?;
    until
        .with_timezone(&Utc)
        .signed_duration_since(now)
        .to_std()
        .ok()
        .filter(|delay| !delay.is_zero())
}
