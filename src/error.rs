//! User-facing error type shared by the clients and the CLI.

use http::StatusCode;
use thiserror::Error;

use crate::http::TransportError;

/// Process exit code for authentication failures.
pub const EXIT_AUTH: u8 = 4;
/// Process exit code for missing resources.
pub const EXIT_NOT_FOUND: u8 = 5;
/// Process exit code when the API kept throttling requests.
pub const EXIT_RATE_LIMITED: u8 = 6;
/// Process exit code for every other failure.
pub const EXIT_GENERAL: u8 = 1;

/// Errors surfaced while resolving inputs or talking to Bitbucket and
/// Confluence.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// No username or API token was configured.
    #[error("credentials are required: set ATLAS_USERNAME and ATLAS_API_TOKEN or configure username/app_password")]
    MissingCredentials,

    /// A pull request or page reference could not be parsed.
    #[error("invalid reference '{input}': {reason}")]
    InvalidReference {
        /// The text the user supplied.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The input is neither a Bitbucket pull request nor a Confluence page.
    #[error("unsupported input '{input}': expected a Bitbucket pull request or Confluence page reference")]
    UnsupportedInput {
        /// The text the user supplied.
        input: String,
    },

    /// The API rejected the credentials (401/403).
    #[error("{resource}: authentication failed ({status}): {message}\nHint: check your username and API token")]
    Authentication {
        /// What was being fetched.
        resource: String,
        /// Response status.
        status: StatusCode,
        /// Message returned by the API.
        message: String,
    },

    /// The resource does not exist or is not visible (404).
    #[error("{resource} not found\nHint: check that it exists and that you have access to it")]
    NotFound {
        /// What was being fetched.
        resource: String,
    },

    /// The API kept answering 429 until the retry budget ran out.
    #[error("{resource}: API rate limit exceeded after {attempts} attempts")]
    RateLimited {
        /// What was being fetched.
        resource: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Any other non-success response.
    #[error("{resource}: API error ({status}): {message}")]
    Api {
        /// What was being fetched.
        resource: String,
        /// Response status.
        status: StatusCode,
        /// Message returned by the API.
        message: String,
    },

    /// The request could not be completed.
    #[error("{resource}: {source}")]
    Transport {
        /// What was being fetched.
        resource: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// A response body did not match the expected shape.
    #[error("{resource}: unexpected response: {message}")]
    Decode {
        /// What was being fetched.
        resource: String,
        /// Decoder error detail.
        message: String,
    },

    /// Local I/O failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },

    /// A fetch task panicked.
    #[error("internal error: {message}")]
    Internal {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl AtlasError {
    /// Maps the error to the process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Authentication { .. } => EXIT_AUTH,
            Self::NotFound { .. } => EXIT_NOT_FOUND,
            Self::RateLimited { .. } => EXIT_RATE_LIMITED,
            _ => EXIT_GENERAL,
        }
    }

    /// Wraps an I/O error.
    #[must_use]
    pub fn io(error: &std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(AtlasError::Authentication {
        resource: "pull request acme/widgets#7".to_owned(),
        status: StatusCode::UNAUTHORIZED,
        message: "Bad credentials".to_owned(),
    }, EXIT_AUTH)]
    #[case(AtlasError::NotFound { resource: "Confluence page 1".to_owned() }, EXIT_NOT_FOUND)]
    #[case(AtlasError::RateLimited { resource: "Confluence search".to_owned(), attempts: 4 }, EXIT_RATE_LIMITED)]
    #[case(AtlasError::MissingCredentials, EXIT_GENERAL)]
    #[case(AtlasError::Cancelled, EXIT_GENERAL)]
    fn maps_errors_to_exit_codes(#[case] error: AtlasError, #[case] expected: u8) {
        assert_eq!(error.exit_code(), expected);
    }

    #[rstest]
    fn not_found_message_carries_hint() {
        let error = AtlasError::NotFound {
            resource: "pull request acme/widgets#7".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "pull request acme/widgets#7 not found\nHint: check that it exists and that you have access to it"
        );
    }
}
