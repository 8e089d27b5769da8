//! Runtime and mock server slots shared by the behavioural tests.

use std::io;
use std::rc::Rc;

use rstest_bdd::Slot;
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer};

/// Runtime handle cheap enough to clone out of a Slot for each step.
#[derive(Clone)]
pub struct SharedRuntime(Rc<Runtime>);

impl SharedRuntime {
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// Starts the runtime and mock server on first use and returns the runtime.
///
/// # Errors
///
/// Returns an error if the Tokio runtime cannot be created.
pub fn ensure_runtime_and_server(
    runtime: &Slot<SharedRuntime>,
    server: &Slot<MockServer>,
) -> Result<SharedRuntime, io::Error> {
    if runtime.with_ref(|_| ()).is_none() {
        runtime.set(SharedRuntime(Rc::new(Runtime::new()?)));
    }
    let shared = runtime
        .get()
        .ok_or_else(|| io::Error::other("runtime not initialised after set"))?;
    if server.with_ref(|_| ()).is_none() {
        server.set(shared.block_on(MockServer::start()));
    }
    Ok(shared)
}

/// Mounts `mock` on the scenario's server, starting it if needed.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
pub fn mount(
    runtime: &Slot<SharedRuntime>,
    server: &Slot<MockServer>,
    mock: Mock,
) -> Result<(), io::Error> {
    let shared = ensure_runtime_and_server(runtime, server)?;
    server
        .with_ref(|started| shared.block_on(mock.mount(started)))
        .ok_or_else(|| io::Error::other("mock server not initialised"))
}

/// Base URL of the scenario's server.
///
/// # Errors
///
/// Returns an error if the server has not been started.
pub fn server_uri(server: &Slot<MockServer>) -> Result<String, io::Error> {
    server
        .with_ref(MockServer::uri)
        .ok_or_else(|| io::Error::other("mock server URL missing"))
}
