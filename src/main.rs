//! Atlas CLI entrypoint for Bitbucket pull request and Confluence page
//! retrieval.

use std::io::{self, Write};
use std::process::ExitCode;

use atlas::{AtlasConfig, AtlasError, cli};
use ortho_config::OrthoConfig;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "Error: {error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<(), AtlasError> {
    let config = load_config()?;
    init_tracing(config.verbose);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling outstanding requests");
            interrupt.cancel();
        }
    });

    cli::run(&config, &cancel, &mut io::stdout().lock()).await
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`AtlasError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<AtlasConfig, AtlasError> {
    AtlasConfig::load().map_err(|error| AtlasError::Configuration {
        message: error.to_string(),
    })
}

/// Logs go to stderr so stdout stays clean for documents. `--verbose`
/// forces debug output; otherwise `RUST_LOG` applies with a warn default.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}
