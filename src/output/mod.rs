//! Rendering of fetched documents.
//!
//! Documents render either as Markdown (pull request header, description,
//! optional diff and comment threads; page metadata and body) or as
//! pretty-printed JSON. Confluence and Bitbucket search hits render as a
//! Markdown list or a JSON array. Pull request tasks render as a checklist.

mod json;
mod markdown;
mod model;

use std::io::Write;

pub use json::write_json;
pub use markdown::{write_bitbucket_search_results, write_markdown, write_search_results};
pub use model::{
    AnnotatedThread, Document, OutputFormat, PullRequestDocument, annotate_threads,
};

use crate::bitbucket::{BitbucketSearch, SearchHits};
use crate::confluence::SearchResult;
use crate::error::AtlasError;

/// Writes a document in the requested format.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing fails.
pub fn write_document<W: Write>(
    writer: &mut W,
    document: &Document,
    format: OutputFormat,
) -> Result<(), AtlasError> {
    match format {
        OutputFormat::Markdown => write_markdown(writer, document),
        OutputFormat::Json => write_json(writer, document),
    }
}

/// Writes search hits in the requested format.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing fails.
pub fn write_search<W: Write>(
    writer: &mut W,
    query: &str,
    results: &[SearchResult],
    format: OutputFormat,
) -> Result<(), AtlasError> {
    match format {
        OutputFormat::Markdown => write_search_results(writer, query, results),
        OutputFormat::Json => write_json(writer, results),
    }
}

/// Writes Bitbucket search hits in the requested format.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing fails.
pub fn write_bitbucket_search<W: Write>(
    writer: &mut W,
    search: &BitbucketSearch,
    hits: &SearchHits,
    format: OutputFormat,
) -> Result<(), AtlasError> {
    match format {
        OutputFormat::Markdown => write_bitbucket_search_results(writer, search, hits),
        OutputFormat::Json => write_json(writer, hits),
    }
}
