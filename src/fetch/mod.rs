//! Authenticated GET requests backed by the response cache.
//!
//! [`Fetcher`] is shared by the Bitbucket and Confluence clients. Each call
//! checks the cache first, then sends through the retrying transport, caching
//! only successful bodies and classifying everything else into
//! [`AtlasError`].

mod error_mapping;

use http::HeaderValue;
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::cache::ResponseCache;
use crate::credentials::Credentials;
use crate::error::AtlasError;
use crate::http::{
    ApiRequest, DEFAULT_REQUEST_TIMEOUT, HttpSend, ReqwestSender, RetryingTransport,
};

use error_mapping::{map_status, map_transport_error};

/// Value sent in the `User-Agent` header.
pub const USER_AGENT_VALUE: &str = concat!("atlas-cli/", env!("CARGO_PKG_VERSION"));

/// Response media type requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// `application/json`
    Json,
    /// `text/plain`, used for raw diffs.
    Text,
}

impl Accept {
    const fn header_value(self) -> HeaderValue {
        match self {
            Self::Json => HeaderValue::from_static("application/json"),
            Self::Text => HeaderValue::from_static("text/plain"),
        }
    }
}

/// Sends authenticated GET requests, consulting the cache first.
pub struct Fetcher {
    transport: RetryingTransport<Box<dyn HttpSend>>,
    cache: ResponseCache,
    authorization: HeaderValue,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher using reqwest with the default timeout and retry
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when the HTTP client cannot be
    /// built or the credentials cannot form a header.
    pub fn new(credentials: &Credentials, cache: ResponseCache) -> Result<Self, AtlasError> {
        let sender =
            ReqwestSender::new(DEFAULT_REQUEST_TIMEOUT).map_err(|error| AtlasError::Configuration {
                message: format!("failed to build HTTP client: {error}"),
            })?;
        let transport = RetryingTransport::new(Box::new(sender) as Box<dyn HttpSend>);
        Self::with_transport(transport, credentials, cache)
    }

    /// Creates a fetcher over an existing transport.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when the credentials contain
    /// bytes that are not valid in an HTTP header.
    pub fn with_transport(
        transport: RetryingTransport<Box<dyn HttpSend>>,
        credentials: &Credentials,
        cache: ResponseCache,
    ) -> Result<Self, AtlasError> {
        let mut authorization = HeaderValue::from_str(&credentials.basic_auth_header())
            .map_err(|_| AtlasError::Configuration {
                message: "credentials contain characters not allowed in an HTTP header"
                    .to_owned(),
            })?;
        authorization.set_sensitive(true);
        Ok(Self {
            transport,
            cache,
            authorization,
        })
    }

    /// Returns the cache backing this fetcher.
    #[must_use]
    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Fetches `url` and returns the raw body.
    ///
    /// `resource` names the thing being fetched in error messages.
    ///
    /// # Errors
    ///
    /// Returns the [`AtlasError`] matching the response status or transport
    /// failure.
    pub async fn get_bytes(
        &self,
        cancel: &CancellationToken,
        resource: &str,
        url: &Url,
        accept: Accept,
    ) -> Result<Vec<u8>, AtlasError> {
        if let Some(body) = self.cache.get(url.as_str()) {
            debug!(url = %url, "cache hit");
            return Ok(body);
        }

        let request = ApiRequest::get(url.clone())
            .with_header(AUTHORIZATION, self.authorization.clone())
            .with_header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .with_header(ACCEPT, accept.header_value());
        let response = self
            .transport
            .send(cancel, request)
            .await
            .map_err(|error| map_transport_error(resource, error))?;

        if !response.status.is_success() {
            return Err(map_status(resource, &response));
        }

        if let Err(error) = self.cache.set(url.as_str(), &response.body) {
            warn!(url = %url, error = %error, "failed to write cache entry");
        }
        Ok(response.body)
    }

    /// Fetches `url` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// As [`Self::get_bytes`], plus [`AtlasError::Decode`] when the body does
    /// not match `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        resource: &str,
        url: &Url,
    ) -> Result<T, AtlasError> {
        let body = self.get_bytes(cancel, resource, url, Accept::Json).await?;
        serde_json::from_slice(&body).map_err(|error| AtlasError::Decode {
            resource: resource.to_owned(),
            message: error.to_string(),
        })
    }

    /// Fetches `url` as plain text.
    ///
    /// # Errors
    ///
    /// As [`Self::get_bytes`].
    pub async fn get_text(
        &self,
        cancel: &CancellationToken,
        resource: &str,
        url: &Url,
    ) -> Result<String, AtlasError> {
        let body = self.get_bytes(cancel, resource, url, Accept::Text).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests;
