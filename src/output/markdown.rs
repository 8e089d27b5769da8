//! Markdown rendering of documents and search results.

use std::io::Write;

use chrono::{DateTime, Utc};

use crate::bitbucket::{
    BitbucketSearch, PullRequest, PullRequestSummary, Repository, SearchHits, SearchKind, Task,
};
use crate::confluence::{Page, SearchResult};
use crate::convert::code_fence;
use crate::error::AtlasError;
use crate::review::{ThreadComment, ThreadLocation};

use super::model::{AnnotatedThread, Document, PullRequestDocument};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Writes one document as Markdown.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing to the output fails.
pub fn write_markdown<W: Write>(writer: &mut W, document: &Document) -> Result<(), AtlasError> {
    match document {
        Document::Bitbucket(pull_request) => write_pull_request(writer, pull_request),
        Document::Confluence(page) => write_page(writer, page),
    }
}

fn write_page<W: Write>(writer: &mut W, page: &Page) -> Result<(), AtlasError> {
    writeln!(writer, "# {}", page.title).map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;

    let space = match (page.space_name.is_empty(), page.space_key.is_empty()) {
        (false, false) => Some(format!("{} ({})", page.space_name, page.space_key)),
        (true, false) => Some(page.space_key.clone()),
        (false, true) => Some(page.space_name.clone()),
        (true, true) => None,
    };
    write_field(writer, "Space", space.as_deref())?;
    write_field(writer, "Author", page.author.as_deref())?;
    write_field(writer, "Updated", page.updated_at.map(format_timestamp).as_deref())?;
    write_field(writer, "Version", page.version.map(|v| v.to_string()).as_deref())?;
    write_field(writer, "URL", page.web_url.as_deref())?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;

    if !page.body.is_empty() {
        writeln!(writer, "{}", page.body).map_err(|e| AtlasError::io(&e))?;
    }
    Ok(())
}

fn write_pull_request<W: Write>(
    writer: &mut W,
    document: &PullRequestDocument,
) -> Result<(), AtlasError> {
    let pr = &document.pull_request;
    write_pull_request_header(writer, pr)?;

    if !pr.description.is_empty() {
        writeln!(writer, "## Description").map_err(|e| AtlasError::io(&e))?;
        writeln!(writer).map_err(|e| AtlasError::io(&e))?;
        writeln!(writer, "{}", pr.description).map_err(|e| AtlasError::io(&e))?;
        writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    }

    write_footer(writer, pr)?;

    if let Some(diff) = document.diff.as_deref().filter(|text| !text.trim().is_empty()) {
        let fence = code_fence(diff);
        writeln!(writer, "## Diff").map_err(|e| AtlasError::io(&e))?;
        writeln!(writer).map_err(|e| AtlasError::io(&e))?;
        writeln!(writer, "{fence}diff").map_err(|e| AtlasError::io(&e))?;
        writeln!(writer, "{}", diff.trim_end_matches('\n')).map_err(|e| AtlasError::io(&e))?;
        writeln!(writer, "{fence}").map_err(|e| AtlasError::io(&e))?;
        writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    }

    if let Some(threads) = &document.threads {
        write_threads(writer, threads)?;
    }
    if let Some(tasks) = document.tasks.as_deref().filter(|tasks| !tasks.is_empty()) {
        if document.threads.as_ref().is_some_and(Vec::is_empty) {
            writeln!(writer).map_err(|e| AtlasError::io(&e))?;
        }
        write_tasks(writer, tasks)?;
    }
    Ok(())
}

/// Writes tasks as a checklist, done tasks ticked.
fn write_tasks<W: Write>(writer: &mut W, tasks: &[Task]) -> Result<(), AtlasError> {
    writeln!(writer, "## Tasks").map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    for task in tasks {
        let checkbox = if task.resolved { "[x]" } else { "[ ]" };
        writeln!(writer, "- {checkbox} {}", task.body).map_err(|e| AtlasError::io(&e))?;
    }
    Ok(())
}

fn write_pull_request_header<W: Write>(writer: &mut W, pr: &PullRequest) -> Result<(), AtlasError> {
    writeln!(writer, "# PR #{}: {}", pr.id, pr.title).map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    writeln!(writer, "**Author**: @{}", pr.author.handle).map_err(|e| AtlasError::io(&e))?;
    writeln!(writer, "**State**: {}", pr.state).map_err(|e| AtlasError::io(&e))?;
    writeln!(
        writer,
        "**Branch**: {} → {}",
        pr.source_branch, pr.destination_branch
    )
    .map_err(|e| AtlasError::io(&e))?;

    let reviewers = pr
        .reviewers
        .iter()
        .map(|reviewer| format!("@{} ({})", reviewer.handle, reviewer.status.label()))
        .collect::<Vec<_>>()
        .join(", ");
    write_field(writer, "Reviewers", Some(reviewers.as_str()).filter(|r| !r.is_empty()))?;
    write_field(writer, "Updated", pr.updated_at.map(format_timestamp).as_deref())?;
    write_field(writer, "URL", pr.web_url.as_deref())?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    Ok(())
}

fn write_footer<W: Write>(writer: &mut W, pr: &PullRequest) -> Result<(), AtlasError> {
    let mut parts = Vec::new();
    if pr.comment_count > 0 {
        parts.push(format!("{} comments", pr.comment_count));
    }
    if pr.task_count > 0 {
        parts.push(format!("{} tasks", pr.task_count));
    }
    if !parts.is_empty() {
        writeln!(writer, "{}", parts.join(", ")).map_err(|e| AtlasError::io(&e))?;
        writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    }
    Ok(())
}

fn write_field<W: Write>(
    writer: &mut W,
    label: &str,
    value: Option<&str>,
) -> Result<(), AtlasError> {
    if let Some(text) = value {
        writeln!(writer, "**{label}**: {text}").map_err(|e| AtlasError::io(&e))?;
    }
    Ok(())
}

/// Writes the comments section: one heading per anchored location, roots in
/// creation order, replies quoted beneath their root.
fn write_threads<W: Write>(writer: &mut W, threads: &[AnnotatedThread]) -> Result<(), AtlasError> {
    writeln!(writer, "## Comments").map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    if threads.is_empty() {
        writeln!(writer, "No comments.").map_err(|e| AtlasError::io(&e))?;
        return Ok(());
    }

    for annotated in threads {
        let location = &annotated.thread.location;
        if !location.is_general() {
            writeln!(writer, "#### `{}`", location_label(location))
                .map_err(|e| AtlasError::io(&e))?;
            writeln!(writer).map_err(|e| AtlasError::io(&e))?;
        }
        if let Some(context) = &annotated.diff_context {
            writeln!(writer, "{context}").map_err(|e| AtlasError::io(&e))?;
            writeln!(writer).map_err(|e| AtlasError::io(&e))?;
        }
        for thread_root in &annotated.thread.roots {
            write_comment(writer, &thread_root.root, "")?;
            for reply in &thread_root.replies {
                write_comment(writer, reply, "> ")?;
            }
        }
    }
    Ok(())
}

fn location_label(location: &ThreadLocation) -> String {
    if location.line > 0 {
        format!("{}:{}", location.path, location.line)
    } else {
        location.path.clone()
    }
}

fn write_comment<W: Write>(
    writer: &mut W,
    annotated: &ThreadComment,
    prefix: &str,
) -> Result<(), AtlasError> {
    let comment = &annotated.comment;
    let author_marker = if annotated.is_pr_author { " (author)" } else { "" };
    let status = if comment.resolved {
        " [RESOLVED]"
    } else if comment.is_inline() {
        " [UNRESOLVED]"
    } else {
        ""
    };
    writeln!(
        writer,
        "{prefix}**@{}**{author_marker} ({}){status}:",
        comment.author_name,
        format_timestamp(comment.created_at)
    )
    .map_err(|e| AtlasError::io(&e))?;
    for line in comment.body.split('\n') {
        writeln!(writer, "{prefix}{line}").map_err(|e| AtlasError::io(&e))?;
    }
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    Ok(())
}

/// Writes search hits as a Markdown list.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing to the output fails.
pub fn write_search_results<W: Write>(
    writer: &mut W,
    query: &str,
    results: &[SearchResult],
) -> Result<(), AtlasError> {
    writeln!(writer, "# Search: {query}").map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    if results.is_empty() {
        writeln!(writer, "No results.").map_err(|e| AtlasError::io(&e))?;
        return Ok(());
    }
    for hit in results {
        let title = hit
            .web_url
            .as_deref()
            .map_or_else(|| hit.title.clone(), |url| format!("[{}]({url})", hit.title));
        let space = if hit.space_key.is_empty() {
            String::new()
        } else {
            format!("{}, ", hit.space_key)
        };
        writeln!(writer, "- {title} ({space}id {})", hit.id).map_err(|e| AtlasError::io(&e))?;
    }
    Ok(())
}

/// Writes Bitbucket repository or pull request hits as a Markdown list
/// under a heading describing the search.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if writing to the output fails.
pub fn write_bitbucket_search_results<W: Write>(
    writer: &mut W,
    search: &BitbucketSearch,
    hits: &SearchHits,
) -> Result<(), AtlasError> {
    writeln!(writer, "# {}", search_heading(search)).map_err(|e| AtlasError::io(&e))?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    if hits.is_empty() {
        writeln!(writer, "No results.").map_err(|e| AtlasError::io(&e))?;
        return Ok(());
    }
    match hits {
        SearchHits::Repositories(repositories) => {
            for repository in repositories {
                writeln!(writer, "- {}", repository_line(repository))
                    .map_err(|e| AtlasError::io(&e))?;
            }
        }
        SearchHits::PullRequests(pull_requests) => {
            for summary in pull_requests {
                writeln!(writer, "- {}", pull_request_line(summary))
                    .map_err(|e| AtlasError::io(&e))?;
            }
        }
    }
    Ok(())
}

fn search_heading(search: &BitbucketSearch) -> String {
    let scope = match (search.kind, search.repository.as_deref()) {
        (SearchKind::PullRequests, Some(slug)) if !slug.trim().is_empty() => {
            format!("Pull requests in {}/{}", search.workspace.trim(), slug.trim())
        }
        (SearchKind::PullRequests, _) => format!("Pull requests in {}", search.workspace.trim()),
        (SearchKind::Repositories, _) => format!("Repositories in {}", search.workspace.trim()),
    };
    let query = search.query.trim();
    if query.is_empty() || search.kind == SearchKind::Repositories {
        scope
    } else {
        format!("{scope} matching \"{query}\"")
    }
}

fn link(label: &str, url: Option<&str>) -> String {
    url.map_or_else(|| label.to_owned(), |href| format!("[{label}]({href})"))
}

fn repository_line(repository: &Repository) -> String {
    let label = if repository.full_name.is_empty() {
        repository.slug.as_str()
    } else {
        repository.full_name.as_str()
    };
    let linked = link(label, repository.web_url.as_deref());
    if repository.description.is_empty() {
        linked
    } else {
        format!("{linked}: {}", repository.description)
    }
}

fn pull_request_line(summary: &PullRequestSummary) -> String {
    let label = format!("{}/{}#{}", summary.workspace, summary.repository, summary.id);
    format!(
        "{}: {} ({}, @{})",
        link(&label, summary.web_url.as_deref()),
        summary.title,
        summary.state,
        summary.author
    )
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
#[path = "markdown_tests.rs"]
mod tests;
