//! Bitbucket payloads and the pull request view built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::convert::html_to_markdown;
use crate::review::CommentNode;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UserPayload {
    pub(crate) uuid: Option<String>,
    pub(crate) account_id: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) nickname: Option<String>,
    pub(crate) display_name: Option<String>,
}

impl UserPayload {
    fn stable_id(&self) -> String {
        self.uuid
            .clone()
            .or_else(|| self.account_id.clone())
            .unwrap_or_default()
    }

    fn handle(&self) -> String {
        [&self.username, &self.nickname, &self.display_name]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_owned())
    }

    fn into_author(self) -> Author {
        Author {
            id: self.stable_id(),
            handle: self.handle(),
            display_name: self.display_name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Link {
    pub(crate) href: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct HtmlLinks {
    pub(crate) html: Link,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Branch {
    pub(crate) name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Endpoint {
    pub(crate) branch: Branch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Markup {
    pub(crate) raw: Option<String>,
    pub(crate) html: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ParticipantPayload {
    pub(crate) user: UserPayload,
    pub(crate) role: String,
    pub(crate) approved: bool,
    pub(crate) state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PullRequestPayload {
    pub(crate) id: u64,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) summary: Markup,
    pub(crate) state: String,
    pub(crate) author: UserPayload,
    pub(crate) source: Endpoint,
    pub(crate) destination: Endpoint,
    pub(crate) updated_on: Option<String>,
    pub(crate) links: HtmlLinks,
    pub(crate) comment_count: u64,
    pub(crate) task_count: u64,
    pub(crate) reviewers: Vec<UserPayload>,
    pub(crate) participants: Vec<ParticipantPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Inline {
    pub(crate) path: Option<String>,
    pub(crate) from: Option<u32>,
    pub(crate) to: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ParentRef {
    pub(crate) id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CommentPayload {
    pub(crate) id: u64,
    pub(crate) content: Markup,
    pub(crate) user: UserPayload,
    pub(crate) created_on: Option<String>,
    pub(crate) inline: Option<Inline>,
    pub(crate) parent: Option<ParentRef>,
    pub(crate) deleted: bool,
    pub(crate) resolution: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RepositoryPayload {
    pub(crate) slug: String,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) description: Option<String>,
    pub(crate) updated_on: Option<String>,
    pub(crate) links: HtmlLinks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TaskPayload {
    pub(crate) id: u64,
    pub(crate) content: Markup,
    pub(crate) state: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub(crate) values: Vec<T>,
    #[serde(default)]
    pub(crate) next: Option<String>,
}

/// A pull request participant as shown to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    /// UUID or account id; empty when the API omitted both.
    pub id: String,
    /// Username, nickname or display name, whichever is present first.
    pub handle: String,
    /// Full display name.
    pub display_name: String,
}

/// Review status of one reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// No verdict yet.
    Pending,
    /// Approved the change.
    Approved,
    /// Requested changes.
    ChangesRequested,
}

impl ReviewStatus {
    /// Label used in rendered output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
        }
    }
}

/// A reviewer and their verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reviewer {
    /// Reviewer handle.
    pub handle: String,
    /// Current verdict.
    pub status: ReviewStatus,
}

/// Pull request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    /// Pull request number.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Description as Markdown.
    pub description: String,
    /// `OPEN`, `MERGED`, `DECLINED` or `SUPERSEDED`.
    pub state: String,
    /// Who opened it.
    pub author: Author,
    /// Branch being merged.
    pub source_branch: String,
    /// Branch merged into.
    pub destination_branch: String,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Browser URL.
    pub web_url: Option<String>,
    /// Number of comments reported by the API.
    pub comment_count: u64,
    /// Number of open tasks reported by the API.
    pub task_count: u64,
    /// Reviewers in the order the API listed them.
    pub reviewers: Vec<Reviewer>,
}

impl PullRequestPayload {
    fn take_description(&mut self) -> String {
        self.description
            .take()
            .filter(|text| !text.trim().is_empty())
            .or_else(|| self.summary.raw.take())
            .unwrap_or_default()
            .trim()
            .to_owned()
    }
}

impl From<PullRequestPayload> for PullRequest {
    fn from(mut payload: PullRequestPayload) -> Self {
        let description = payload.take_description();
        let reviewers = merge_reviewers(payload.reviewers, payload.participants);
        Self {
            id: payload.id,
            title: payload.title,
            description,
            state: payload.state,
            author: payload.author.into_author(),
            source_branch: payload.source.branch.name,
            destination_branch: payload.destination.branch.name,
            updated_at: payload.updated_on.as_deref().and_then(parse_timestamp),
            web_url: payload.links.html.href,
            comment_count: payload.comment_count,
            task_count: payload.task_count,
            reviewers,
        }
    }
}

/// A repository listed in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// `workspace/slug`.
    pub full_name: String,
    /// Repository description, empty when unset.
    pub description: String,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Browser URL.
    pub web_url: Option<String>,
}

impl From<RepositoryPayload> for Repository {
    fn from(payload: RepositoryPayload) -> Self {
        Self {
            slug: payload.slug,
            name: payload.name,
            full_name: payload.full_name,
            description: payload.description.unwrap_or_default().trim().to_owned(),
            updated_at: payload.updated_on.as_deref().and_then(parse_timestamp),
            web_url: payload.links.html.href,
        }
    }
}

/// A pull request as listed by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestSummary {
    /// Workspace slug.
    pub workspace: String,
    /// Repository slug.
    pub repository: String,
    /// Pull request number.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Description as Markdown.
    pub description: String,
    /// Pull request state.
    pub state: String,
    /// Author handle.
    pub author: String,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Browser URL.
    pub web_url: Option<String>,
}

impl PullRequestSummary {
    pub(crate) fn from_payload(
        workspace: &str,
        repository: &str,
        mut payload: PullRequestPayload,
    ) -> Self {
        let description = payload.take_description();
        Self {
            workspace: workspace.to_owned(),
            repository: repository.to_owned(),
            id: payload.id,
            title: payload.title,
            description,
            state: payload.state,
            author: payload.author.handle(),
            updated_at: payload.updated_on.as_deref().and_then(parse_timestamp),
            web_url: payload.links.html.href,
        }
    }

    /// Case-insensitive substring match on the title and description.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        needle.is_empty()
            || self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

/// A pull request task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Task identifier.
    pub id: u64,
    /// Task text on a single line.
    pub body: String,
    /// Whether the task was marked done.
    pub resolved: bool,
}

impl From<TaskPayload> for Task {
    fn from(payload: TaskPayload) -> Self {
        let text = payload
            .content
            .raw
            .filter(|raw| !raw.trim().is_empty())
            .or_else(|| payload.content.html.as_deref().map(html_to_markdown))
            .unwrap_or_default();
        Self {
            id: payload.id,
            body: text.split_whitespace().collect::<Vec<_>>().join(" "),
            resolved: payload.state.eq_ignore_ascii_case("RESOLVED"),
        }
    }
}

/// Listed reviewers start as pending; reviewer participants refine the
/// status and may add reviewers the list omitted.
fn merge_reviewers(
    listed: Vec<UserPayload>,
    participants: Vec<ParticipantPayload>,
) -> Vec<Reviewer> {
    let mut reviewers: Vec<Reviewer> = Vec::new();
    for user in listed {
        let handle = user.handle();
        if !reviewers.iter().any(|reviewer| reviewer.handle == handle) {
            reviewers.push(Reviewer {
                handle,
                status: ReviewStatus::Pending,
            });
        }
    }
    for participant in participants
        .into_iter()
        .filter(|participant| participant.role == "REVIEWER")
    {
        let status = if participant.approved {
            ReviewStatus::Approved
        } else if participant.state.as_deref() == Some("changes_requested") {
            ReviewStatus::ChangesRequested
        } else {
            ReviewStatus::Pending
        };
        let handle = participant.user.handle();
        match reviewers.iter_mut().find(|reviewer| reviewer.handle == handle) {
            Some(existing) => existing.status = status,
            None => reviewers.push(Reviewer { handle, status }),
        }
    }
    reviewers
}

impl CommentPayload {
    /// Flattens the payload into the correlator's comment shape.
    ///
    /// The anchored line is `inline.to` (new side), else `inline.from`.
    pub(crate) fn into_node(self) -> CommentNode {
        let body = comment_body(&self.content);
        let (path, line) = self.inline.map_or((None, None), |inline| {
            (inline.path, inline.to.or(inline.from))
        });
        CommentNode {
            id: self.id,
            author_id: self.user.stable_id(),
            author_name: self.user.handle(),
            created_at: self
                .created_on
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            body,
            path: path.filter(|value| !value.is_empty()),
            line,
            parent_id: self.parent.map(|parent| parent.id),
            resolved: self.resolution.is_some(),
            deleted: self.deleted,
        }
    }
}

fn comment_body(content: &Markup) -> String {
    let converted = content
        .html
        .as_deref()
        .map(html_to_markdown)
        .filter(|markdown| !markdown.is_empty());
    converted
        .or_else(|| content.raw.as_deref().map(|raw| raw.trim().to_owned()))
        .unwrap_or_default()
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
