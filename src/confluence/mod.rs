//! Confluence pages: id parsing, page retrieval and CQL search.

pub mod client;
pub mod locator;
pub mod models;

pub use client::{ConfluenceClient, DEFAULT_SEARCH_LIMIT, PAGE_EXPAND, SearchOptions};
pub use locator::{PageId, derive_api_base, normalize_site};
pub use models::{Page, SearchResult};
