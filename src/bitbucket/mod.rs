//! Bitbucket Cloud: reference parsing, pull request metadata, diffs, review
//! comments, tasks, and repository and pull request searches.

pub mod client;
pub mod locator;
pub mod models;

pub use client::{
    BitbucketClient, BitbucketSearch, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, SearchHits, SearchKind,
};
pub use locator::PullRequestRef;
pub use models::{
    Author, PullRequest, PullRequestSummary, Repository, ReviewStatus, Reviewer, Task,
};
