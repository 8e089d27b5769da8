//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.atlas.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `ATLAS_USERNAME`, `ATLAS_APP_PASSWORD`,
//!    `ATLAS_CONFLUENCE_SITE` and friends
//! 4. **Command-line arguments** – `--url`/`-u`, `--search`/`-s`,
//!    `--bitbucket-search`/`-b`, ...
//!
//! # Configuration File
//!
//! ```toml
//! username = "jane@example.com"
//! app_password = "${env:ATLASSIAN_TOKEN}"
//! confluence_site = "https://acme.atlassian.net"
//! concurrency = 8
//! cache_ttl_seconds = 600
//! ```

use std::env;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::bitbucket::{BitbucketSearch, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, SearchKind};
use crate::cache::DEFAULT_TTL;
use crate::confluence::{DEFAULT_SEARCH_LIMIT, normalize_site};
use crate::error::AtlasError;
use crate::output::OutputFormat;
use crate::worker::DEFAULT_CONCURRENCY;

/// Environment variable overriding the Confluence site.
pub const CONFLUENCE_BASE_URL_ENV: &str = "ATLAS_CONFLUENCE_BASE_URL";

/// Environment variable overriding the Bitbucket REST root.
pub const BITBUCKET_BASE_URL_ENV: &str = "ATLAS_BITBUCKET_BASE_URL";

/// Value of `url` that reads inputs from standard input.
pub const STDIN_MARKER: &str = "-";

const MAX_PAGE_SIZE: u32 = 100;

/// Operation mode determined by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Fetch one or more pull requests or pages.
    Fetch,
    /// Run a Confluence search.
    Search,
    /// List Bitbucket repositories or pull requests.
    BitbucketSearch,
    /// Clear the response cache and exit.
    ClearCache,
}

/// Where fetch inputs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// References given in configuration.
    Listed(Vec<String>),
    /// One reference per line on standard input.
    Stdin,
}

/// Application configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `ATLAS_URL` or `--url`: references to fetch
/// - `ATLAS_USERNAME` or `--username`: account identity
/// - `ATLAS_APP_PASSWORD`, `ATLAS_API_TOKEN` or `--app-password`: secret
/// - `ATLAS_CONFLUENCE_SITE`, `ATLAS_CONFLUENCE_BASE_URL` or
///   `--confluence-site`: Confluence site
/// - `ATLAS_BITBUCKET_BASE_URL` or `--bitbucket-base-url`: Bitbucket REST root
/// - `ATLAS_WORKSPACE` or `--workspace`: Bitbucket workspace for searches
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "ATLAS",
    discovery(
        dotfile_name = ".atlas.toml",
        config_file_name = "atlas.toml",
        app_name = "atlas"
    )
)]
pub struct AtlasConfig {
    /// Pull request or page references to fetch, separated by commas or
    /// whitespace. `-` reads them from standard input.
    ///
    /// Can be provided via:
    /// - CLI: `--url <REF>` or `-u <REF>`
    /// - Environment: `ATLAS_URL`
    #[ortho_config(cli_short = 'u')]
    pub url: Option<String>,

    /// Account identity (username or e-mail). May contain `${env:NAME}`.
    ///
    /// Can be provided via:
    /// - CLI: `--username <NAME>` or `-U <NAME>`
    /// - Environment: `ATLAS_USERNAME` or `ATLASSIAN_EMAIL`
    /// - Config file: `username = "..."`
    #[ortho_config(cli_short = 'U')]
    pub username: Option<String>,

    /// App password or API token. May contain `${env:NAME}`.
    ///
    /// Can be provided via:
    /// - CLI: `--app-password <SECRET>` or `-P <SECRET>`
    /// - Environment: `ATLAS_APP_PASSWORD`, `ATLAS_API_TOKEN` or
    ///   `ATLASSIAN_TOKEN`
    /// - Config file: `app_password = "..."`
    #[ortho_config(cli_short = 'P')]
    pub app_password: Option<String>,

    /// Confluence site, for example `https://acme.atlassian.net`.
    ///
    /// Can be provided via:
    /// - CLI: `--confluence-site <URL>` or `-C <URL>`
    /// - Environment: `ATLAS_CONFLUENCE_SITE` or `ATLAS_CONFLUENCE_BASE_URL`
    /// - Config file: `confluence_site = "..."`
    #[ortho_config(cli_short = 'C')]
    pub confluence_site: Option<String>,

    /// Bitbucket REST root. Defaults to the Bitbucket Cloud API.
    ///
    /// Can be provided via:
    /// - CLI: `--bitbucket-base-url <URL>` or `-B <URL>`
    /// - Environment: `ATLAS_BITBUCKET_BASE_URL`
    #[ortho_config(cli_short = 'B')]
    pub bitbucket_base_url: Option<String>,

    /// Maximum number of inputs fetched at once.
    #[ortho_config(cli_short = 'j')]
    pub concurrency: usize,

    /// Comments requested per Bitbucket page (1 to 100).
    #[ortho_config(cli_short = 'p')]
    pub page_size: u32,

    /// Lifetime of cached responses, in seconds.
    #[ortho_config(cli_short = 't')]
    pub cache_ttl_seconds: u64,

    /// Bypasses the response cache.
    ///
    /// Note: like other booleans, this cannot be set from the environment
    /// because `ortho_config` does not load boolean values from it.
    #[ortho_config(cli_short = 'N')]
    pub no_cache: bool,

    /// Deletes cached responses before doing anything else.
    #[ortho_config(cli_short = 'X')]
    pub clear_cache: bool,

    /// Includes review comments for pull requests.
    #[ortho_config(cli_short = 'c')]
    pub comments: bool,

    /// Includes the unified diff for pull requests.
    #[ortho_config(cli_short = 'd')]
    pub diff: bool,

    /// Keeps resolved comment threads.
    #[ortho_config(cli_short = 'r')]
    pub include_resolved: bool,

    /// Output format: `markdown` or `json`.
    #[ortho_config(cli_short = 'f')]
    pub format: String,

    /// Confluence search query.
    #[ortho_config(cli_short = 's')]
    pub search: Option<String>,

    /// Restricts searches to one space key.
    #[ortho_config(cli_short = 'S')]
    pub space: Option<String>,

    /// Treats the search query as raw CQL.
    #[ortho_config(cli_short = 'q')]
    pub cql: bool,

    /// Maximum number of search results.
    #[ortho_config(cli_short = 'l')]
    pub limit: u32,

    /// Lists Bitbucket `repos` or `prs` instead of searching Confluence.
    /// `--search` then filters pull requests by title and description.
    #[ortho_config(cli_short = 'b')]
    pub bitbucket_search: Option<String>,

    /// Bitbucket workspace searched by `--bitbucket-search`.
    ///
    /// Can be provided via:
    /// - CLI: `--workspace <SLUG>` or `-w <SLUG>`
    /// - Environment: `ATLAS_WORKSPACE`
    /// - Config file: `workspace = "..."`
    #[ortho_config(cli_short = 'w')]
    pub workspace: Option<String>,

    /// Limits pull request searches to one repository.
    #[ortho_config(cli_short = 'R')]
    pub repository: Option<String>,

    /// Includes merged, declined and superseded pull requests in searches.
    #[ortho_config(cli_short = 'o')]
    pub include_closed: bool,

    /// Enables debug logging.
    #[ortho_config(cli_short = 'v')]
    pub verbose: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            app_password: None,
            confluence_site: None,
            bitbucket_base_url: None,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            cache_ttl_seconds: DEFAULT_TTL.as_secs(),
            no_cache: false,
            clear_cache: false,
            comments: false,
            diff: false,
            include_resolved: false,
            format: OutputFormat::Markdown.to_string(),
            search: None,
            space: None,
            cql: false,
            limit: DEFAULT_SEARCH_LIMIT,
            bitbucket_search: None,
            workspace: None,
            repository: None,
            include_closed: false,
            verbose: false,
        }
    }
}

impl AtlasConfig {
    /// Checks that the loaded values are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a zero concurrency, a page
    /// size outside 1..=100, a zero search limit, an unknown output format,
    /// or when both `url` and `search` are set.
    pub fn validate(&self) -> Result<(), AtlasError> {
        if self.concurrency == 0 {
            return Err(configuration("concurrency must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(configuration(&format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.limit == 0 {
            return Err(configuration("limit must be at least 1"));
        }
        self.output_format()?;
        if has_text(self.url.as_deref()) && has_text(self.search.as_deref()) {
            return Err(configuration(
                "--url and --search cannot be combined; run them separately",
            ));
        }
        if has_text(self.url.as_deref()) && has_text(self.bitbucket_search.as_deref()) {
            return Err(configuration(
                "--url and --bitbucket-search cannot be combined; run them separately",
            ));
        }
        if let Some(kind) = configured(self.bitbucket_search.as_deref()) {
            kind.parse::<SearchKind>()?;
        }
        Ok(())
    }

    /// Builds the Bitbucket search request.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when no search type or workspace
    /// is configured, or the type is unknown.
    pub fn bitbucket_search_request(&self) -> Result<BitbucketSearch, AtlasError> {
        let kind = configured(self.bitbucket_search.as_deref())
            .ok_or_else(|| configuration("--bitbucket-search needs a type: 'repos' or 'prs'"))?
            .parse()?;
        let workspace = configured(self.workspace.as_deref()).ok_or_else(|| {
            configuration("--bitbucket-search needs a workspace (use --workspace or ATLAS_WORKSPACE)")
        })?;
        Ok(BitbucketSearch {
            kind,
            workspace,
            repository: configured(self.repository.as_deref()),
            query: self.search.as_deref().unwrap_or_default().trim().to_owned(),
            include_closed: self.include_closed,
            limit: self.limit,
        })
    }

    /// Parses the configured output format.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for an unknown format.
    pub fn output_format(&self) -> Result<OutputFormat, AtlasError> {
        self.format.parse()
    }

    /// Determines the operation mode.
    ///
    /// A Bitbucket search wins over a Confluence search, whose query it
    /// borrows; searches win over fetching; clearing the cache alone is a
    /// mode of its own.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when there is nothing to do.
    pub fn operation_mode(&self) -> Result<OperationMode, AtlasError> {
        if has_text(self.bitbucket_search.as_deref()) {
            Ok(OperationMode::BitbucketSearch)
        } else if has_text(self.search.as_deref()) {
            Ok(OperationMode::Search)
        } else if has_text(self.url.as_deref()) {
            Ok(OperationMode::Fetch)
        } else if self.clear_cache {
            Ok(OperationMode::ClearCache)
        } else {
            Err(configuration(
                "nothing to do: pass --url <REF> (or '-' for stdin), --search <QUERY> \
                 or --bitbucket-search <repos|prs>",
            ))
        }
    }

    /// Splits `url` into individual references.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] when no reference is given or
    /// when `-` is mixed with other references.
    pub fn input_source(&self) -> Result<InputSource, AtlasError> {
        let inputs: Vec<String> = self
            .url
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        match inputs.as_slice() {
            [] => Err(configuration("no inputs provided")),
            [only] if only == STDIN_MARKER => Ok(InputSource::Stdin),
            _ if inputs.iter().any(|input| input == STDIN_MARKER) => Err(configuration(
                "'-' must be used alone to read from stdin",
            )),
            _ => Ok(InputSource::Listed(inputs)),
        }
    }

    /// Cache lifetime as a [`Duration`].
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Service roots resolved from configuration and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrls {
    /// Bitbucket REST root.
    pub bitbucket: Url,
    /// Confluence site, when one is configured.
    pub confluence: Option<Url>,
}

impl BaseUrls {
    /// Resolves both service roots.
    ///
    /// `ATLAS_CONFLUENCE_BASE_URL` takes precedence over `confluence_site`;
    /// the Bitbucket root falls back to the public API.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a URL that does not parse.
    pub fn resolve(config: &AtlasConfig) -> Result<Self, AtlasError> {
        let bitbucket_raw = non_empty_env(BITBUCKET_BASE_URL_ENV)
            .or_else(|| configured(config.bitbucket_base_url.as_deref()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let bitbucket = Url::parse(bitbucket_raw.trim()).map_err(|e| AtlasError::Configuration {
            message: format!("invalid Bitbucket base URL '{bitbucket_raw}': {e}"),
        })?;

        let confluence = non_empty_env(CONFLUENCE_BASE_URL_ENV)
            .or_else(|| configured(config.confluence_site.as_deref()))
            .map(|raw| normalize_site(&raw))
            .transpose()?;

        Ok(Self {
            bitbucket,
            confluence,
        })
    }
}

/// Error reported when a Confluence page or search needs a site that was
/// never configured.
pub(crate) fn missing_confluence_site() -> AtlasError {
    configuration(
        "Confluence site is not configured (use --confluence-site, \
         ATLAS_CONFLUENCE_SITE or ATLAS_CONFLUENCE_BASE_URL)",
    )
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn configured(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}

fn configuration(message: &str) -> AtlasError {
    AtlasError::Configuration {
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests;
