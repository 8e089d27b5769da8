//! Renderable documents and the output format selector.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::bitbucket::{PullRequest, Task};
use crate::confluence::Page;
use crate::error::AtlasError;
use crate::review::{DiffIndex, Thread};

/// Supported output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable Markdown.
    #[default]
    Markdown,
    /// Pretty-printed JSON, one document per input.
    Json,
}

impl FromStr for OutputFormat {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(AtlasError::Configuration {
                message: format!(
                    "unsupported output format '{s}': valid options are 'markdown' or 'json'"
                ),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// The rendered result of one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Document {
    /// A Bitbucket pull request.
    Bitbucket(PullRequestDocument),
    /// A Confluence page.
    Confluence(Page),
}

/// A pull request with the optional diff and comment threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestDocument {
    /// Workspace slug.
    pub workspace: String,
    /// Repository slug.
    pub repository: String,
    /// Metadata.
    #[serde(flatten)]
    pub pull_request: PullRequest,
    /// Raw unified diff, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Comment threads, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<Vec<AnnotatedThread>>,
    /// Tasks, fetched together with comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
}

/// A thread together with the diff excerpt around its anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedThread {
    /// The thread.
    #[serde(flatten)]
    pub thread: Thread,
    /// Fenced diff excerpt, when a hunk covers the anchor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_context: Option<String>,
}

/// Attaches diff context to line-anchored threads.
#[must_use]
pub fn annotate_threads(threads: Vec<Thread>, diff: Option<&DiffIndex>) -> Vec<AnnotatedThread> {
    threads
        .into_iter()
        .map(|thread| {
            let diff_context = diff
                .filter(|_| !thread.location.is_general() && thread.location.line > 0)
                .and_then(|index| {
                    index.format_diff_context(&thread.location.path, thread.location.line)
                });
            AnnotatedThread {
                thread,
                diff_context,
            }
        })
        .collect()
}
