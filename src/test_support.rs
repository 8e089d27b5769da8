//! Helpers shared by the REST client tests.

use std::sync::Arc;

use tokio::runtime::Runtime;
use wiremock::MockServer;

use crate::cache::ResponseCache;
use crate::credentials::Credentials;
use crate::fetch::Fetcher;
use crate::http::{
    BackoffPolicy, DEFAULT_REQUEST_TIMEOUT, HttpSend, NoJitter, ReqwestSender, RetryingTransport,
};

/// `Authorization` value produced by [`test_credentials`].
pub(crate) const TEST_AUTH_HEADER: &str = "Basic dGVzdEBleGFtcGxlLmNvbTp0ZXN0LXRva2Vu";

/// Retries allowed by [`fetcher`]; small so exhaustion tests stay quick.
pub(crate) const TEST_MAX_RETRIES: u32 = 2;

pub(crate) fn test_credentials() -> Credentials {
    Credentials::new("test@example.com", "test-token").expect("test credentials are valid")
}

/// Builds a fetcher that retries without sleeping.
pub(crate) fn fetcher(cache: ResponseCache) -> Fetcher {
    let sender = ReqwestSender::new(DEFAULT_REQUEST_TIMEOUT).expect("HTTP client should build");
    let transport = RetryingTransport::new(Box::new(sender) as Box<dyn HttpSend>)
        .with_policy(BackoffPolicy::immediate())
        .with_jitter(Arc::new(NoJitter))
        .with_max_retries(TEST_MAX_RETRIES);
    Fetcher::with_transport(transport, &test_credentials(), cache).expect("fetcher should build")
}

pub(crate) trait BlocksOnRuntime {
    fn runtime(&self) -> &Runtime;

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime().block_on(future)
    }
}

/// A runtime paired with a mock server started on it.
pub(crate) struct ServerHarness {
    pub(crate) runtime: Runtime,
    pub(crate) server: MockServer,
}

impl ServerHarness {
    pub(crate) fn start() -> Self {
        let runtime = Runtime::new().expect("runtime should start");
        let server = runtime.block_on(MockServer::start());
        Self { runtime, server }
    }
}

impl BlocksOnRuntime for ServerHarness {
    fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}
