//! Page id extraction and site URL handling.

use std::fmt;

use url::Url;

use crate::bitbucket::locator::is_digits;
use crate::error::AtlasError;

const API_SUFFIX: [&str; 3] = ["wiki", "rest", "api"];

/// A numeric Confluence page id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(String);

impl PageId {
    /// Extracts a page id from a bare number or a page URL.
    ///
    /// URLs are searched in order for a `pageId` query parameter, a fragment
    /// (`#pageId=<id>` or `#<id>`), and a `/pages/<id>` path segment.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::InvalidReference`] when no id can be found.
    pub fn parse(input: &str) -> Result<Self, AtlasError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "Confluence reference is empty"));
        }
        if is_digits(trimmed) {
            return Ok(Self(trimmed.to_owned()));
        }

        let parsed = Url::parse(trimmed)
            .ok()
            .filter(|url| url.host_str().is_some())
            .ok_or_else(|| invalid(input, "unable to parse Confluence URL"))?;

        query_page_id(&parsed)
            .or_else(|| parsed.fragment().and_then(fragment_page_id))
            .or_else(|| path_page_id(&parsed))
            .map(Self)
            .ok_or_else(|| invalid(input, "could not locate a Confluence page id"))
    }

    /// Borrow the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn query_page_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == "pageId" && is_digits(value))
        .map(|(_, value)| value.into_owned())
}

fn fragment_page_id(fragment: &str) -> Option<String> {
    let trimmed = fragment.trim();
    if trimmed.contains('=') {
        let found = url::form_urlencoded::parse(trimmed.as_bytes())
            .find(|(key, value)| key == "pageId" && is_digits(value))
            .map(|(_, value)| value.into_owned());
        if found.is_some() {
            return found;
        }
    }
    is_digits(trimmed).then(|| trimmed.to_owned())
}

fn path_page_id(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments().map(Iterator::collect).unwrap_or_default();
    segments.windows(2).find_map(|window| match *window {
        ["pages", candidate] if is_digits(candidate) => Some(candidate.to_owned()),
        _ => None,
    })
}

/// Parses a configured site, defaulting the scheme to `https`.
///
/// # Errors
///
/// Returns [`AtlasError::Configuration`] when the value is blank or not a
/// URL.
pub fn normalize_site(raw: &str) -> Result<Url, AtlasError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AtlasError::Configuration {
            message: "Confluence site is empty".to_owned(),
        });
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    Url::parse(&candidate).map_err(|error| AtlasError::Configuration {
        message: format!("invalid Confluence site '{trimmed}': {error}"),
    })
}

/// Derives the REST root (`.../wiki/rest/api`) from a site URL.
///
/// Sites already ending in `/wiki/rest/api` are kept, a trailing `/wiki` is
/// not duplicated.
#[must_use]
pub fn derive_api_base(site: &Url) -> Url {
    let mut api = site.clone();
    let mut segments: Vec<String> = site
        .path_segments()
        .map(|parts| {
            parts
                .filter(|part| !part.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();

    if segments.ends_with(&API_SUFFIX.map(str::to_owned)) {
        api.set_path(&format!("/{}", segments.join("/")));
        return api;
    }
    if segments.last().is_some_and(|last| last == "wiki") {
        segments.pop();
    }
    segments.extend(API_SUFFIX.map(str::to_owned));
    api.set_path(&format!("/{}", segments.join("/")));
    api.set_query(None);
    api.set_fragment(None);
    api
}

fn invalid(input: &str, reason: &str) -> AtlasError {
    AtlasError::InvalidReference {
        input: input.to_owned(),
        reason: reason.to_owned(),
    }
}
