//! REST calls against the Confluence Cloud content and search APIs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::locator::{PageId, derive_api_base};
use super::models::{
    ContentPayload, LinkSet, Page, SearchPayload, SearchResult, parse_version_time,
};
use crate::convert::html_to_markdown;
use crate::error::AtlasError;
use crate::fetch::Fetcher;

/// Fields expanded when fetching a page.
pub const PAGE_EXPAND: &str = "body.storage,space,version";

/// Search results requested unless configured otherwise.
pub const DEFAULT_SEARCH_LIMIT: u32 = 25;

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Free text, or a CQL expression when `cql` is set.
    pub query: String,
    /// Restricts free-text searches to one space.
    pub space: Option<String>,
    /// Treats `query` as raw CQL.
    pub cql: bool,
    /// Maximum number of results; zero leaves the server default.
    pub limit: u32,
}

impl SearchOptions {
    /// Builds the CQL expression sent to the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a blank query.
    pub fn to_cql(&self) -> Result<String, AtlasError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(AtlasError::Configuration {
                message: "search query cannot be empty".to_owned(),
            });
        }
        if self.cql {
            return Ok(query.to_owned());
        }
        let clause = format!("text ~ \"{}\"", escape_cql(query));
        Ok(
            match self.space.as_deref().map(str::trim).filter(|space| !space.is_empty()) {
                Some(space) => format!("space = \"{}\" AND {clause}", escape_cql(space)),
                None => clause,
            },
        )
    }
}

fn escape_cql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Confluence client sharing one [`Fetcher`] with other clients.
#[derive(Debug, Clone)]
pub struct ConfluenceClient {
    fetcher: Arc<Fetcher>,
    site: Url,
    api_base: Url,
}

impl ConfluenceClient {
    /// Creates a client for `site`; the REST root is derived from it.
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>, site: Url) -> Self {
        let api_base = derive_api_base(&site);
        Self {
            fetcher,
            site,
            api_base,
        }
    }

    /// REST root used for requests.
    #[must_use]
    pub const fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Fetches a page and converts its storage body to Markdown.
    ///
    /// # Errors
    ///
    /// Returns the [`AtlasError`] reported by the fetcher, or
    /// [`AtlasError::Decode`] for an unexpected payload.
    pub async fn page(
        &self,
        cancel: &CancellationToken,
        id: &PageId,
    ) -> Result<Page, AtlasError> {
        let mut url = self.endpoint(&["content", id.as_str()])?;
        url.query_pairs_mut().append_pair("expand", PAGE_EXPAND);
        let resource = format!("Confluence page {id}");
        let payload: ContentPayload = self.fetcher.get_json(cancel, &resource, &url).await?;

        let web_url = self.resolve_web_url(&payload.links);
        Ok(Page {
            body: html_to_markdown(&payload.body.storage.value),
            updated_at: payload.version.when.as_deref().and_then(parse_version_time),
            author: payload.version.by.display_name,
            version: payload.version.number,
            id: payload.id,
            title: payload.title,
            space_key: payload.space.key,
            space_name: payload.space.name,
            web_url,
        })
    }

    /// Runs a search and returns the hits that carry a page id.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a blank query, otherwise the
    /// [`AtlasError`] reported by the fetcher.
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, AtlasError> {
        let cql = options.to_cql()?;
        let mut url = self.endpoint(&["search"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("cql", &cql);
            if options.limit > 0 {
                query.append_pair("limit", &options.limit.to_string());
            }
        }
        debug!(cql = %cql, "searching Confluence");
        let payload: SearchPayload = self
            .fetcher
            .get_json(cancel, "Confluence search", &url)
            .await?;

        Ok(payload
            .results
            .into_iter()
            .map(|hit| hit.content)
            .filter(|content| !content.id.is_empty())
            .map(|content| SearchResult {
                web_url: self.resolve_web_url(&content.links),
                id: content.id,
                title: content.title,
                space_key: content.space.key,
                space_name: content.space.name,
            })
            .collect())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AtlasError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| AtlasError::Configuration {
                message: format!("Confluence site cannot hold a path: {}", self.site),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Absolute `webui` links are used as-is; relative ones are appended to
    /// `_links.base`, falling back to the configured site.
    fn resolve_web_url(&self, links: &LinkSet) -> Option<String> {
        let webui = links
            .webui
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())?;
        if webui.starts_with("http://") || webui.starts_with("https://") {
            return Some(webui.to_owned());
        }
        let base = links
            .base
            .as_deref()
            .map(str::trim)
            .filter(|raw| Url::parse(raw).is_ok())
            .map_or_else(|| self.site.as_str().to_owned(), ToOwned::to_owned);
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            webui.trim_start_matches('/')
        ))
    }
}
