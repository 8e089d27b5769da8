//! Parsing of pull request references.

use std::fmt;

use url::Url;

use crate::error::AtlasError;

const PULL_REQUEST_MARKERS: [&str; 2] = ["pull-requests", "pullrequests"];

/// Identifies one pull request: workspace, repository slug and number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    workspace: String,
    repository: String,
    id: u64,
}

impl PullRequestRef {
    /// Builds a reference from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::InvalidReference`] for blank names or a zero id.
    pub fn new(workspace: &str, repository: &str, id: u64) -> Result<Self, AtlasError> {
        let display = format!("{workspace}/{repository}#{id}");
        if workspace.trim().is_empty() || repository.trim().is_empty() {
            return Err(invalid(&display, "workspace and repository are required"));
        }
        if id == 0 {
            return Err(invalid(&display, "pull request id must be positive"));
        }
        Ok(Self {
            workspace: workspace.trim().to_owned(),
            repository: repository.trim().to_owned(),
            id,
        })
    }

    /// Parses `workspace/repo#id` or a pull request URL such as
    /// `https://bitbucket.org/<workspace>/<repo>/pull-requests/<id>`.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::InvalidReference`] when `input` matches neither
    /// form.
    pub fn parse(input: &str) -> Result<Self, AtlasError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "pull request reference is empty"));
        }
        if !trimmed.contains("://")
            && let Some((repository_path, id_part)) = trimmed.split_once('#')
        {
            return Self::parse_short_form(trimmed, repository_path, id_part);
        }
        Self::parse_url(trimmed)
    }

    fn parse_short_form(
        input: &str,
        repository_path: &str,
        id_part: &str,
    ) -> Result<Self, AtlasError> {
        let path = repository_path.trim_end_matches('/');
        let mut parts = path.split('/');
        let (Some(workspace), Some(repository), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(input, "expected workspace/repo#id"));
        };
        let id = id_part
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(input, "pull request id must be numeric"))?;
        Self::new(workspace, repository, id)
            .map_err(|_| invalid(input, "expected workspace/repo#id"))
    }

    fn parse_url(input: &str) -> Result<Self, AtlasError> {
        let parsed =
            Url::parse(input).map_err(|error| invalid(input, &format!("not a URL: {error}")))?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(Iterator::collect)
            .unwrap_or_default();

        segments
            .windows(4)
            .find_map(|window| match *window {
                [workspace, repository, marker, id]
                    if PULL_REQUEST_MARKERS.contains(&marker)
                        && !workspace.is_empty()
                        && !repository.is_empty()
                        && is_digits(id) =>
                {
                    id.parse::<u64>()
                        .ok()
                        .and_then(|number| Self::new(workspace, repository, number).ok())
                }
                _ => None,
            })
            .ok_or_else(|| invalid(input, "could not locate a pull request identifier"))
    }

    /// Workspace slug.
    #[must_use]
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Repository slug.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Pull request number.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.workspace, self.repository, self.id)
    }
}

pub(crate) fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

fn invalid(input: &str, reason: &str) -> AtlasError {
    AtlasError::InvalidReference {
        input: input.to_owned(),
        reason: reason.to_owned(),
    }
}
