//! Classifies failed responses and transport errors.

use http::StatusCode;

use crate::error::AtlasError;
use crate::http::{ApiResponse, LastFailure, TransportError};

const MAX_MESSAGE_CHARS: usize = 200;

const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Maps a non-success response to an [`AtlasError`].
pub(crate) fn map_status(resource: &str, response: &ApiResponse) -> AtlasError {
    let status = response.status;
    if status == StatusCode::NOT_FOUND {
        return AtlasError::NotFound {
            resource: resource.to_owned(),
        };
    }
    let message = extract_message(&response.body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_owned()
    });
    if is_auth_failure(status) {
        AtlasError::Authentication {
            resource: resource.to_owned(),
            status,
            message,
        }
    } else {
        AtlasError::Api {
            resource: resource.to_owned(),
            status,
            message,
        }
    }
}

/// Maps a transport failure to an [`AtlasError`].
pub(crate) fn map_transport_error(resource: &str, error: TransportError) -> AtlasError {
    match error {
        TransportError::Cancelled => AtlasError::Cancelled,
        TransportError::Exhausted {
            attempts,
            source: LastFailure::Status(status),
        } if status == StatusCode::TOO_MANY_REQUESTS => AtlasError::RateLimited {
            resource: resource.to_owned(),
            attempts,
        },
        TransportError::Exhausted {
            attempts,
            source: LastFailure::Status(status),
        } => AtlasError::Api {
            resource: resource.to_owned(),
            status,
            message: format!("still failing after {attempts} attempts"),
        },
        other => AtlasError::Transport {
            resource: resource.to_owned(),
            source: other,
        },
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Bitbucket nests it under `error.message`, Confluence uses a top-level
/// `message`. Non-JSON bodies fall back to their leading text.
fn extract_message(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let nested = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(serde_json::Value::as_str);
        let top_level = value.get("message").and_then(serde_json::Value::as_str);
        return nested.or(top_level).map(ToOwned::to_owned);
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_MESSAGE_CHARS).collect())
}
