//! Confluence and Bitbucket search modes.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bitbucket::BitbucketSearch;
use crate::confluence::SearchOptions;
use crate::error::AtlasError;
use crate::output::{OutputFormat, write_bitbucket_search, write_search};

use super::Session;

/// Runs one search and writes the hits to `out`.
///
/// # Errors
///
/// Returns [`AtlasError::Configuration`] when no Confluence site is
/// configured or the query is blank, otherwise the client's error.
pub async fn run<W: Write>(
    session: &Session,
    options: &SearchOptions,
    format: OutputFormat,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), AtlasError> {
    let results = session.confluence()?.search(cancel, options).await?;
    debug!(query = %options.query, hits = results.len(), "search complete");
    write_search(out, &options.query, &results, format)?;
    out.flush().map_err(|e| AtlasError::io(&e))
}

/// Lists Bitbucket repositories or pull requests and writes them to `out`.
///
/// # Errors
///
/// Returns [`AtlasError::Configuration`] for a blank workspace, otherwise
/// the client's error.
pub async fn run_bitbucket<W: Write>(
    session: &Session,
    request: &BitbucketSearch,
    format: OutputFormat,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), AtlasError> {
    let hits = session.bitbucket().search(cancel, request).await?;
    debug!(
        kind = %request.kind,
        workspace = %request.workspace,
        hits = hits.len(),
        "Bitbucket search complete"
    );
    write_bitbucket_search(out, request, &hits, format)?;
    out.flush().map_err(|e| AtlasError::io(&e))
}
