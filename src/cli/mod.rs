//! CLI operation mode handlers.
//!
//! - [`fetch`]: fetch pull requests and pages concurrently and print them in
//!   input order
//! - [`search`]: run a Confluence search, or list Bitbucket repositories
//!   and pull requests
//!
//! [`run`] validates configuration, handles `--clear-cache` and dispatches on
//! the [`OperationMode`].

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bitbucket::BitbucketClient;
use crate::cache::ResponseCache;
use crate::config::{AtlasConfig, BaseUrls, InputSource, OperationMode, missing_confluence_site};
use crate::confluence::{ConfluenceClient, SearchOptions};
use crate::credentials::{ConfigCredentials, CredentialProvider};
use crate::error::AtlasError;
use crate::fetch::Fetcher;

pub mod fetch;
pub mod search;

pub use fetch::{FetchOptions, InputKind, fetch_all, fetch_document};

/// Clients shared by every task of one invocation.
#[derive(Debug)]
pub struct Session {
    bitbucket: BitbucketClient,
    confluence: Option<ConfluenceClient>,
}

impl Session {
    /// Builds the clients over one shared fetcher.
    #[must_use]
    pub fn new(fetcher: &Arc<Fetcher>, urls: &BaseUrls, page_size: u32) -> Self {
        let bitbucket = BitbucketClient::new(Arc::clone(fetcher), urls.bitbucket.clone())
            .with_page_size(page_size);
        let confluence = urls
            .confluence
            .clone()
            .map(|site| ConfluenceClient::new(Arc::clone(fetcher), site));
        Self {
            bitbucket,
            confluence,
        }
    }

    /// Resolves credentials and service roots, then builds the clients.
    ///
    /// # Errors
    ///
    /// Returns the credential provider's error, or
    /// [`AtlasError::Configuration`] for an invalid base URL.
    pub fn connect(
        config: &AtlasConfig,
        provider: &dyn CredentialProvider,
        cache: ResponseCache,
    ) -> Result<Self, AtlasError> {
        let credentials = provider.credentials()?;
        let urls = BaseUrls::resolve(config)?;
        debug!(
            identity = credentials.identity(),
            bitbucket = %urls.bitbucket,
            confluence = ?urls.confluence.as_ref().map(url::Url::as_str),
            "session configured"
        );
        let fetcher = Arc::new(Fetcher::new(&credentials, cache)?);
        Ok(Self::new(&fetcher, &urls, config.page_size))
    }

    /// Bitbucket client.
    #[must_use]
    pub const fn bitbucket(&self) -> &BitbucketClient {
        &self.bitbucket
    }

    /// Confluence client, if a site is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when no site is configured.
    pub fn confluence(&self) -> Result<&ConfluenceClient, AtlasError> {
        self.confluence.as_ref().ok_or_else(missing_confluence_site)
    }
}

/// Runs the operation selected by `config`, writing documents to `out`.
///
/// # Errors
///
/// Returns the first [`AtlasError`] encountered; documents rendered before
/// the failure are still written.
pub async fn run<W: Write>(
    config: &AtlasConfig,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), AtlasError> {
    config.validate()?;
    let mode = config.operation_mode()?;
    let format = config.output_format()?;

    if config.clear_cache {
        clear_cache(config)?;
    }

    match mode {
        OperationMode::ClearCache => {
            writeln!(out, "Cache cleared.").map_err(|e| AtlasError::io(&e))?;
            Ok(())
        }
        OperationMode::Search => {
            let session = connect(config)?;
            let options = SearchOptions {
                query: config.search.clone().unwrap_or_default(),
                space: config.space.clone(),
                cql: config.cql,
                limit: config.limit,
            };
            search::run(&session, &options, format, cancel, out).await
        }
        OperationMode::BitbucketSearch => {
            let request = config.bitbucket_search_request()?;
            let session = connect(config)?;
            search::run_bitbucket(&session, &request, format, cancel, out).await
        }
        OperationMode::Fetch => {
            let inputs = match config.input_source()? {
                InputSource::Listed(inputs) => inputs,
                InputSource::Stdin => read_inputs(io::stdin().lock())?,
            };
            let session = Arc::new(connect(config)?);
            let options = FetchOptions {
                comments: config.comments,
                diff: config.diff,
                include_resolved: config.include_resolved,
                format,
            };
            fetch_all(&session, inputs, options, config.concurrency, cancel, out).await
        }
    }
}

fn connect(config: &AtlasConfig) -> Result<Session, AtlasError> {
    Session::connect(
        config,
        &ConfigCredentials::from_config(config),
        open_cache(config),
    )
}

fn open_cache(config: &AtlasConfig) -> ResponseCache {
    if config.no_cache {
        debug!("response cache disabled by configuration");
        return ResponseCache::disabled();
    }
    ResponseCache::default_dir().map_or_else(
        || {
            warn!("no cache directory available; responses will not be cached");
            ResponseCache::disabled()
        },
        |dir| ResponseCache::new(dir, config.cache_ttl()),
    )
}

/// Deletes cached responses; `--no-cache` does not prevent clearing.
fn clear_cache(config: &AtlasConfig) -> Result<(), AtlasError> {
    let Some(dir) = ResponseCache::default_dir() else {
        return Ok(());
    };
    info!(%dir, "clearing response cache");
    ResponseCache::new(dir, config.cache_ttl())
        .clear()
        .map_err(|error| AtlasError::Io {
            message: format!("failed to clear cache: {error}"),
        })
}

/// Reads one reference per non-blank line.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] when reading fails and
/// [`AtlasError::Configuration`] when no reference was supplied.
pub fn read_inputs<R: BufRead>(reader: R) -> Result<Vec<String>, AtlasError> {
    let mut inputs = Vec::new();
    for line in reader.lines() {
        let text = line.map_err(|e| AtlasError::io(&e))?;
        let candidate = text.trim();
        if !candidate.is_empty() {
            inputs.push(candidate.to_owned());
        }
    }
    if inputs.is_empty() {
        return Err(AtlasError::Configuration {
            message: "no input provided via stdin".to_owned(),
        });
    }
    Ok(inputs)
}
