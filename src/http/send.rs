//! The capability to send one HTTP request, plus its reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;

use super::error::SendError;
use super::request::{ApiResponse, PreparedRequest};

/// Timeout applied to each individual attempt by [`ReqwestSender::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends a single prepared request and reads the full response.
///
/// Implementations must not retry; [`super::RetryingTransport`] owns that
/// decision.
#[async_trait]
pub trait HttpSend: Send + Sync {
    /// Performs one attempt.
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, SendError>;
}

#[async_trait]
impl<T: HttpSend + ?Sized> HttpSend for Box<T> {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, SendError> {
        (**self).send(request).await
    }
}

/// Reqwest-backed sender.
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    /// Builds a sender whose attempts time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Fatal`] when the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> Result<Self, SendError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map(Self::from_client)
            .map_err(|error| SendError::Fatal {
                message: error.to_string(),
            })
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(&self, request: PreparedRequest) -> Result<ApiResponse, SendError> {
        let PreparedRequest {
            method,
            url,
            headers: request_headers,
            body: request_body,
        } = request;

        let mut builder = self.client.request(method, url).headers(request_headers);
        if let Some(bytes) = request_body {
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(|error| classify(&error))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| classify(&error))?
            .to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Network-level failures are transient; builder and decode failures are not.
fn classify(error: &reqwest::Error) -> SendError {
    let message = error.to_string();
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        SendError::Transient { message }
    } else {
        SendError::Fatal { message }
    }
}
