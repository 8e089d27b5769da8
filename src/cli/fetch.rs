//! Concurrent fetching of pull requests and pages.

use std::collections::BTreeMap;
use std::io::Write;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bitbucket::PullRequestRef;
use crate::confluence::PageId;
use crate::error::AtlasError;
use crate::output::{
    Document, OutputFormat, PullRequestDocument, annotate_threads, write_document,
};
use crate::review::{DiffIndex, ThreadOptions, build_threads_with};
use crate::worker::{Pool, PoolError};

use super::Session;

/// What to include for each input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Fetch and thread review comments, and list tasks.
    pub comments: bool,
    /// Include the unified diff.
    pub diff: bool,
    /// Keep resolved threads.
    pub include_resolved: bool,
    /// Rendering format.
    pub format: OutputFormat,
}

/// A parsed input reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// A Bitbucket pull request.
    PullRequest(PullRequestRef),
    /// A Confluence page.
    Page(PageId),
}

impl InputKind {
    /// Classifies `input`, trying pull request syntax before page ids.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::UnsupportedInput`] when neither parser accepts
    /// the input.
    pub fn detect(input: &str) -> Result<Self, AtlasError> {
        if let Ok(reference) = PullRequestRef::parse(input) {
            return Ok(Self::PullRequest(reference));
        }
        PageId::parse(input)
            .map(Self::Page)
            .map_err(|_| AtlasError::UnsupportedInput {
                input: input.trim().to_owned(),
            })
    }
}

/// Fetches one input and builds its document.
///
/// # Errors
///
/// Returns the first client error. A diff that only serves as comment
/// context degrades to no context when it cannot be fetched.
pub async fn fetch_document(
    session: &Session,
    input: &str,
    options: FetchOptions,
    cancel: &CancellationToken,
) -> Result<Document, AtlasError> {
    match InputKind::detect(input)? {
        InputKind::Page(id) => {
            debug!(page = %id, "fetching Confluence page");
            let page = session.confluence()?.page(cancel, &id).await?;
            Ok(Document::Confluence(page))
        }
        InputKind::PullRequest(reference) => {
            debug!(pull_request = %reference, "fetching Bitbucket pull request");
            fetch_pull_request(session, &reference, options, cancel).await
        }
    }
}

async fn fetch_pull_request(
    session: &Session,
    reference: &PullRequestRef,
    options: FetchOptions,
    cancel: &CancellationToken,
) -> Result<Document, AtlasError> {
    let client = session.bitbucket();
    let comments = async {
        if options.comments {
            client.comments(cancel, reference).await.map(Some)
        } else {
            Ok(None)
        }
    };
    let diff = async {
        if options.diff {
            return client.diff(cancel, reference).await.map(Some);
        }
        if !options.comments {
            return Ok(None);
        }
        match client.diff(cancel, reference).await {
            Ok(text) => Ok(Some(text)),
            Err(AtlasError::Cancelled) => Err(AtlasError::Cancelled),
            Err(error) => {
                warn!(pull_request = %reference, %error, "diff unavailable; comments shown without context");
                Ok(None)
            }
        }
    };
    let tasks = async {
        if options.comments {
            client.tasks(cancel, reference).await.map(Some)
        } else {
            Ok(None)
        }
    };
    let (pull_request, comment_nodes, diff_text, tasks) =
        tokio::try_join!(client.pull_request(cancel, reference), comments, diff, tasks)?;

    let threads = comment_nodes.map(|nodes| {
        let built = build_threads_with(
            &nodes,
            &ThreadOptions {
                include_resolved: options.include_resolved,
                pr_author_id: Some(pull_request.author.id.clone()),
            },
        );
        let index = diff_text.as_deref().map(DiffIndex::parse);
        annotate_threads(built, index.as_ref())
    });

    Ok(Document::Bitbucket(PullRequestDocument {
        workspace: reference.workspace().to_owned(),
        repository: reference.repository().to_owned(),
        pull_request,
        diff: diff_text.filter(|_| options.diff),
        threads,
        tasks,
    }))
}

/// Fetches every input on a bounded pool and writes the rendered documents
/// to `out` in input order.
///
/// # Errors
///
/// Returns the first task failure after writing the documents that did
/// complete.
pub async fn fetch_all<W: Write>(
    session: &Arc<Session>,
    inputs: Vec<String>,
    options: FetchOptions,
    concurrency: usize,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<(), AtlasError> {
    let rendered: Arc<Mutex<BTreeMap<usize, Vec<u8>>>> = Arc::default();
    let mut pool: Pool<AtlasError> = Pool::new(cancel, concurrency);

    for (index, input) in inputs.into_iter().enumerate() {
        let task_session = Arc::clone(session);
        let task_rendered = Arc::clone(&rendered);
        let submitted = pool
            .submit(move |token| async move {
                let document = fetch_document(&task_session, &input, options, &token).await?;
                let mut buffer = Vec::new();
                write_document(&mut buffer, &document, options.format)?;
                task_rendered
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(index, buffer);
                Ok(())
            })
            .await;
        if submitted.is_err() {
            debug!(index, "pool cancelled; remaining inputs skipped");
            break;
        }
    }

    let outcome = pool.wait().await;
    let buffers = mem::take(&mut *rendered.lock().unwrap_or_else(PoisonError::into_inner));
    for (position, buffer) in buffers.into_values().enumerate() {
        if position > 0 && options.format == OutputFormat::Markdown {
            writeln!(out).map_err(|e| AtlasError::io(&e))?;
        }
        out.write_all(&buffer).map_err(|e| AtlasError::io(&e))?;
    }
    out.flush().map_err(|e| AtlasError::io(&e))?;

    match outcome {
        Ok(summary) => {
            debug!(succeeded = summary.succeeded, "all inputs fetched");
            Ok(())
        }
        Err(PoolError::Task(error)) => Err(error),
        Err(PoolError::Cancelled) => Err(AtlasError::Cancelled),
        Err(PoolError::Panicked { message }) => Err(AtlasError::Internal { message }),
    }
}
