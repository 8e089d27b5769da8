//! Review-comment correlation.
//!
//! [`DiffIndex`] parses a unified diff into per-file hunks and answers which
//! hunk covers a given line. [`build_threads`] groups flat comment lists into
//! location-keyed threads of roots and flattened replies.

pub mod diff_index;
pub mod threads;

pub use diff_index::{DEFAULT_CONTEXT_RADIUS, DiffHunk, DiffIndex, DiffLine, LineKind};
pub use threads::{
    CommentNode, Thread, ThreadComment, ThreadLocation, ThreadOptions, ThreadRoot, build_threads,
    build_threads_with,
};
