//! Atlas library crate for retrieving Bitbucket Cloud pull requests and
//! Confluence Cloud pages as Markdown or JSON.
//!
//! The library parses pull request and page references, fetches them through
//! a retrying, caching HTTP layer, threads review comments with diff context
//! and renders the result. Fetches run on a bounded worker pool that cancels
//! outstanding work after the first failure.

pub mod bitbucket;
pub mod cache;
pub mod cli;
pub mod config;
pub mod confluence;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod http;
pub mod output;
pub mod review;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AtlasConfig;
pub use error::AtlasError;
pub use output::{Document, OutputFormat};
