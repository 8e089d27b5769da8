//! Errors raised by cache writes.

use std::io;

use thiserror::Error;

/// Failure while writing to or pruning the cache directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("cache I/O error ({operation}): {message}")]
    Io {
        /// What the cache was doing.
        operation: &'static str,
        /// Error detail from the filesystem.
        message: String,
    },

    /// The entry could not be serialised.
    #[error("cache entry could not be encoded: {message}")]
    Encode {
        /// Serializer error detail.
        message: String,
    },
}

impl CacheError {
    pub(super) fn io(operation: &'static str, error: &io::Error) -> Self {
        Self::Io {
            operation,
            message: error.to_string(),
        }
    }
}
