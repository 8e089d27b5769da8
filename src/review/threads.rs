//! Groups flat review comments into location-keyed threads.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A review comment as delivered by the API, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    /// Comment identifier.
    pub id: u64,
    /// Stable author identifier (UUID or account id).
    pub author_id: String,
    /// Name shown to readers.
    pub author_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Comment text as Markdown.
    pub body: String,
    /// File the comment is anchored to.
    pub path: Option<String>,
    /// Line the comment is anchored to.
    pub line: Option<u32>,
    /// Comment this one replies to.
    pub parent_id: Option<u64>,
    /// Whether the thread was resolved.
    pub resolved: bool,
    /// Whether the comment was deleted.
    pub deleted: bool,
}

impl CommentNode {
    /// Returns true for comments anchored to a file.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.path.is_some()
    }

    /// A line number means nothing without a file, so unanchored comments
    /// all share the general bucket.
    fn location(&self) -> ThreadLocation {
        self.path
            .as_ref()
            .map_or_else(ThreadLocation::default, |path| ThreadLocation {
                path: path.clone(),
                line: self.line.unwrap_or(0),
            })
    }

    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.id)
    }
}

/// Where a thread is anchored.
///
/// Ordering is by path, then line. General comments use the empty path and
/// line zero, so they sort first; file-level comments (line zero) sort ahead
/// of line comments on the same path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ThreadLocation {
    /// File path, empty for general comments.
    pub path: String,
    /// Line number, zero when not line-anchored.
    pub line: u32,
}

impl ThreadLocation {
    /// Returns true for the bucket of comments without a file anchor.
    #[must_use]
    pub const fn is_general(&self) -> bool {
        self.path.is_empty()
    }
}

/// A comment with presentation annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadComment {
    /// The comment.
    #[serde(flatten)]
    pub comment: CommentNode,
    /// Whether the comment was written by the pull request author.
    pub is_pr_author: bool,
}

/// A root comment with every descendant flattened beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRoot {
    /// The un-parented comment.
    pub root: ThreadComment,
    /// Descendants in creation order.
    pub replies: Vec<ThreadComment>,
}

/// All roots sharing one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    /// Shared anchor.
    pub location: ThreadLocation,
    /// Roots in creation order.
    pub roots: Vec<ThreadRoot>,
}

/// Options for [`build_threads_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadOptions {
    /// Keep resolved comments.
    pub include_resolved: bool,
    /// Author id of the pull request, used for the author annotation.
    pub pr_author_id: Option<String>,
}

/// Builds threads without author annotation.
#[must_use]
pub fn build_threads(comments: &[CommentNode], include_resolved: bool) -> Vec<Thread> {
    build_threads_with(
        comments,
        &ThreadOptions {
            include_resolved,
            pr_author_id: None,
        },
    )
}

/// Builds threads from a flat comment list.
///
/// Deleted comments are dropped, as are resolved ones unless requested.
/// A reply is attached to the root at the top of its parent chain; replies
/// whose chain reaches a dropped or unknown comment are dropped too.
#[must_use]
pub fn build_threads_with(comments: &[CommentNode], options: &ThreadOptions) -> Vec<Thread> {
    let visible: HashMap<u64, &CommentNode> = comments
        .iter()
        .filter(|comment| !comment.deleted && (options.include_resolved || !comment.resolved))
        .map(|comment| (comment.id, comment))
        .collect();

    let mut replies_by_root: HashMap<u64, Vec<&CommentNode>> = HashMap::new();
    let mut roots: Vec<&CommentNode> = Vec::new();
    for comment in visible.values().copied() {
        if comment.parent_id.is_none() {
            roots.push(comment);
        } else if let Some(root_id) = find_root(comment, &visible) {
            replies_by_root.entry(root_id).or_default().push(comment);
        }
    }
    roots.sort_by_key(|comment| comment.order_key());

    let annotate = |comment: &CommentNode| ThreadComment {
        comment: comment.clone(),
        is_pr_author: options
            .pr_author_id
            .as_deref()
            .is_some_and(|author| !author.is_empty() && author == comment.author_id),
    };

    let mut grouped: BTreeMap<ThreadLocation, Vec<ThreadRoot>> = BTreeMap::new();
    for root in roots {
        let mut replies = replies_by_root.remove(&root.id).unwrap_or_default();
        replies.sort_by_key(|comment| comment.order_key());
        grouped.entry(root.location()).or_default().push(ThreadRoot {
            root: annotate(root),
            replies: replies.into_iter().map(&annotate).collect(),
        });
    }

    grouped
        .into_iter()
        .map(|(location, thread_roots)| Thread {
            location,
            roots: thread_roots,
        })
        .collect()
}

/// Walks parent links up to an un-parented comment.
fn find_root(comment: &CommentNode, visible: &HashMap<u64, &CommentNode>) -> Option<u64> {
    let mut seen = HashSet::new();
    let mut current = comment;
    while let Some(parent_id) = current.parent_id {
        if !seen.insert(current.id) {
            return None;
        }
        current = visible.get(&parent_id)?;
    }
    Some(current.id)
}
