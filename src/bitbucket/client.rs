//! REST calls against the Bitbucket Cloud 2.0 API.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::locator::PullRequestRef;
use super::models::{
    CommentPayload, Page, PullRequest, PullRequestPayload, PullRequestSummary, Repository,
    RepositoryPayload, Task, TaskPayload,
};
use crate::error::AtlasError;
use crate::fetch::Fetcher;
use crate::review::CommentNode;

/// Public Bitbucket Cloud API root.
pub const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";

/// Comments requested per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// What a Bitbucket search lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Repositories in a workspace.
    Repositories,
    /// Pull requests in one repository or across a workspace.
    PullRequests,
}

impl FromStr for SearchKind {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "repos" | "repositories" => Ok(Self::Repositories),
            "prs" | "pull-requests" | "pullrequests" => Ok(Self::PullRequests),
            _ => Err(AtlasError::Configuration {
                message: format!(
                    "unsupported Bitbucket search type '{s}': valid options are 'repos' or 'prs'"
                ),
            }),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repositories => write!(f, "repos"),
            Self::PullRequests => write!(f, "prs"),
        }
    }
}

/// A Bitbucket search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitbucketSearch {
    /// What to list.
    pub kind: SearchKind,
    /// Workspace slug.
    pub workspace: String,
    /// Limits pull request searches to one repository.
    pub repository: Option<String>,
    /// Text matched against pull request titles and descriptions.
    pub query: String,
    /// Includes merged, declined and superseded pull requests.
    pub include_closed: bool,
    /// Maximum number of results; zero means no limit.
    pub limit: u32,
}

impl BitbucketSearch {
    /// Builds the `q` filter sent with pull request listings, if any.
    #[must_use]
    pub fn pull_request_filter(&self) -> Option<String> {
        let query = self.query.trim();
        let mut clauses = Vec::new();
        if !query.is_empty() {
            let escaped = query.replace('\\', "\\\\").replace('"', "\\\"");
            clauses.push(format!(
                "(title ~ \"{escaped}\" OR summary.raw ~ \"{escaped}\")"
            ));
        }
        if !self.include_closed {
            clauses.push("state = \"OPEN\"".to_owned());
        }
        (!clauses.is_empty()).then(|| clauses.join(" AND "))
    }

    fn limit(&self) -> Option<usize> {
        usize::try_from(self.limit).ok().filter(|limit| *limit > 0)
    }
}

/// Results of a Bitbucket search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SearchHits {
    /// Repository listing.
    Repositories(Vec<Repository>),
    /// Pull request listing.
    PullRequests(Vec<PullRequestSummary>),
}

impl SearchHits {
    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Repositories(repositories) => repositories.len(),
            Self::PullRequests(pull_requests) => pull_requests.len(),
        }
    }

    /// Returns true when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bitbucket client sharing one [`Fetcher`] with other clients.
#[derive(Debug, Clone)]
pub struct BitbucketClient {
    fetcher: Arc<Fetcher>,
    base_url: Url,
    page_size: u32,
}

impl BitbucketClient {
    /// Creates a client rooted at `base_url`.
    #[must_use]
    pub const fn new(fetcher: Arc<Fetcher>, base_url: Url) -> Self {
        Self {
            fetcher,
            base_url,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the `pagelen` used for paginated endpoints. Zero becomes one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetches pull request metadata.
    ///
    /// # Errors
    ///
    /// Returns the [`AtlasError`] reported by the fetcher, or
    /// [`AtlasError::Decode`] for an unexpected payload.
    pub async fn pull_request(
        &self,
        cancel: &CancellationToken,
        reference: &PullRequestRef,
    ) -> Result<PullRequest, AtlasError> {
        let url = self.pull_request_url(reference, &[])?;
        let resource = format!("pull request {reference}");
        let payload: PullRequestPayload = self.fetcher.get_json(cancel, &resource, &url).await?;
        Ok(PullRequest::from(payload))
    }

    /// Fetches the unified diff of a pull request.
    ///
    /// # Errors
    ///
    /// Returns the [`AtlasError`] reported by the fetcher.
    pub async fn diff(
        &self,
        cancel: &CancellationToken,
        reference: &PullRequestRef,
    ) -> Result<String, AtlasError> {
        let url = self.pull_request_url(reference, &["diff"])?;
        let resource = format!("diff for {reference}");
        self.fetcher.get_text(cancel, &resource, &url).await
    }

    /// Fetches every comment on a pull request, following `next` links.
    ///
    /// # Errors
    ///
    /// Returns the first page failure; comments from earlier pages are
    /// discarded.
    pub async fn comments(
        &self,
        cancel: &CancellationToken,
        reference: &PullRequestRef,
    ) -> Result<Vec<CommentNode>, AtlasError> {
        let url = self.paged(self.pull_request_url(reference, &["comments"])?);
        let resource = format!("comments for {reference}");
        self.collect_pages(cancel, &resource, url, None, |payload: CommentPayload| {
            Some(payload.into_node())
        })
        .await
    }

    /// Fetches the tasks of a pull request, following `next` links.
    ///
    /// # Errors
    ///
    /// Returns the first page failure.
    pub async fn tasks(
        &self,
        cancel: &CancellationToken,
        reference: &PullRequestRef,
    ) -> Result<Vec<Task>, AtlasError> {
        let url = self.paged(self.pull_request_url(reference, &["tasks"])?);
        let resource = format!("tasks for {reference}");
        self.collect_pages(cancel, &resource, url, None, |payload: TaskPayload| {
            Some(Task::from(payload))
        })
        .await
    }

    /// Lists the repositories of `workspace`, stopping after `limit` entries
    /// when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a blank workspace, otherwise
    /// the first page failure.
    pub async fn repositories(
        &self,
        cancel: &CancellationToken,
        workspace: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Repository>, AtlasError> {
        let workspace = required_workspace(workspace)?;
        let url = self.paged(self.api_url(&["repositories", workspace])?);
        let resource = format!("repositories in {workspace}");
        self.collect_pages(cancel, &resource, url, limit, |payload: RepositoryPayload| {
            Some(Repository::from(payload))
        })
        .await
    }

    /// Lists pull requests matching `search`.
    ///
    /// Without a repository every repository of the workspace is searched in
    /// listing order until the limit is reached. Summaries are filtered
    /// locally as well, so servers that ignore `q` still yield matches only.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::Configuration`] for a blank workspace, otherwise
    /// the first page failure.
    pub async fn search_pull_requests(
        &self,
        cancel: &CancellationToken,
        search: &BitbucketSearch,
    ) -> Result<Vec<PullRequestSummary>, AtlasError> {
        let workspace = required_workspace(&search.workspace)?;
        let repositories = match search
            .repository
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
        {
            Some(slug) => vec![slug.to_owned()],
            None => self
                .repositories(cancel, workspace, None)
                .await?
                .into_iter()
                .map(|repository| repository.slug)
                .collect(),
        };

        let filter = search.pull_request_filter();
        let mut results = Vec::new();
        for slug in repositories {
            let remaining = search
                .limit()
                .map(|limit| limit.saturating_sub(results.len()));
            if remaining == Some(0) {
                break;
            }
            let mut url = self.paged(self.api_url(&[
                "repositories",
                workspace,
                slug.as_str(),
                "pullrequests",
            ])?);
            if let Some(expression) = &filter {
                url.query_pairs_mut().append_pair("q", expression);
            }
            let resource = format!("pull requests in {workspace}/{slug}");
            let found = self
                .collect_pages(cancel, &resource, url, remaining, |payload: PullRequestPayload| {
                    let summary = PullRequestSummary::from_payload(workspace, &slug, payload);
                    summary.matches(&search.query).then_some(summary)
                })
                .await?;
            debug!(repository = %slug, count = found.len(), "pull requests matched");
            results.extend(found);
        }
        Ok(results)
    }

    /// Runs a repository or pull request search.
    ///
    /// # Errors
    ///
    /// As [`Self::repositories`] and [`Self::search_pull_requests`].
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        search: &BitbucketSearch,
    ) -> Result<SearchHits, AtlasError> {
        match search.kind {
            SearchKind::Repositories => self
                .repositories(cancel, &search.workspace, search.limit())
                .await
                .map(SearchHits::Repositories),
            SearchKind::PullRequests => self
                .search_pull_requests(cancel, search)
                .await
                .map(SearchHits::PullRequests),
        }
    }

    /// Follows `next` links from `first`, mapping each value and keeping the
    /// ones `map` returns. Stops once `limit` values are kept; a zero limit
    /// means no limit.
    async fn collect_pages<P, T>(
        &self,
        cancel: &CancellationToken,
        resource: &str,
        first: Url,
        limit: Option<usize>,
        mut map: impl FnMut(P) -> Option<T>,
    ) -> Result<Vec<T>, AtlasError>
    where
        P: DeserializeOwned,
    {
        let limit = limit.filter(|max| *max > 0);
        let mut collected = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first);
        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.as_str().to_owned()) {
                debug!(url = %page_url, "pagination loop detected; stopping");
                break;
            }
            let page: Page<P> = self.fetcher.get_json(cancel, resource, &page_url).await?;
            debug!(url = %page_url, count = page.values.len(), "fetched page");
            for value in page.values {
                if let Some(item) = map(value) {
                    collected.push(item);
                }
                if limit.is_some_and(|max| collected.len() >= max) {
                    return Ok(collected);
                }
            }
            next = page
                .next
                .filter(|link| !link.is_empty())
                .map(|link| parse_next(resource, &page_url, &link))
                .transpose()?;
        }
        Ok(collected)
    }

    fn paged(&self, mut url: Url) -> Url {
        url.query_pairs_mut()
            .append_pair("pagelen", &self.page_size.to_string());
        url
    }

    fn pull_request_url(
        &self,
        reference: &PullRequestRef,
        suffix: &[&str],
    ) -> Result<Url, AtlasError> {
        let id = reference.id().to_string();
        let mut segments = vec![
            "repositories",
            reference.workspace(),
            reference.repository(),
            "pullrequests",
            id.as_str(),
        ];
        segments.extend_from_slice(suffix);
        self.api_url(&segments)
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, AtlasError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AtlasError::Configuration {
                message: format!("Bitbucket base URL cannot hold a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn required_workspace(workspace: &str) -> Result<&str, AtlasError> {
    let trimmed = workspace.trim();
    if trimmed.is_empty() {
        return Err(AtlasError::Configuration {
            message: "a Bitbucket workspace is required (use --workspace or ATLAS_WORKSPACE)"
                .to_owned(),
        });
    }
    Ok(trimmed)
}

fn parse_next(resource: &str, current: &Url, link: &str) -> Result<Url, AtlasError> {
    current.join(link).map_err(|error| AtlasError::Decode {
        resource: resource.to_owned(),
        message: format!("invalid next link '{link}': {error}"),
    })
}
