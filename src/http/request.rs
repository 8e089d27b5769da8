//! Request and response values exchanged with a sender.

use std::fmt;
use std::io::{self, Read};

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

/// Body attached to an outgoing request.
pub enum RequestBody {
    /// Bytes already held in memory.
    Bytes(Vec<u8>),
    /// A one-shot reader. It is drained once before the first attempt.
    Reader(Box<dyn Read + Send + Sync>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl RequestBody {
    fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer)?;
                Ok(buffer)
            }
        }
    }
}

/// A logical request built by an API client.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl ApiRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches a request body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL including the query string.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Headers set so far.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Buffers the body so the request can be sent repeatedly.
    pub(crate) fn into_prepared(self) -> io::Result<PreparedRequest> {
        let body = self.body.map(RequestBody::into_bytes).transpose()?;
        Ok(PreparedRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body,
        })
    }
}

/// A request whose body is held in memory, cloned once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// Request method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Buffered body, if any.
    pub body: Option<Vec<u8>>,
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response with empty headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
