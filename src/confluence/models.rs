//! Confluence payloads and the page views built from them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const VERSION_WHEN_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LinkSet {
    pub(crate) webui: Option<String>,
    pub(crate) base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SpacePayload {
    pub(crate) key: String,
    pub(crate) name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Storage {
    pub(crate) value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Body {
    pub(crate) storage: Storage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct VersionAuthor {
    pub(crate) display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VersionPayload {
    pub(crate) number: Option<u64>,
    pub(crate) when: Option<String>,
    pub(crate) by: VersionAuthor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ContentPayload {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) body: Body,
    pub(crate) space: SpacePayload,
    pub(crate) version: VersionPayload,
    #[serde(rename = "_links")]
    pub(crate) links: LinkSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SearchHit {
    pub(crate) content: ContentPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SearchPayload {
    pub(crate) results: Vec<SearchHit>,
}

/// A Confluence page converted to Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Space key.
    pub space_key: String,
    /// Space name.
    pub space_name: String,
    /// Browser URL.
    pub web_url: Option<String>,
    /// Page body as Markdown.
    pub body: String,
    /// Author of the current version.
    pub author: Option<String>,
    /// When the current version was published.
    pub updated_at: Option<DateTime<Utc>>,
    /// Current version number.
    pub version: Option<u64>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Page id.
    pub id: String,
    /// Page title.
    pub title: String,
    /// Space key.
    pub space_key: String,
    /// Space name.
    pub space_name: String,
    /// Browser URL.
    pub web_url: Option<String>,
}

/// Parses `version.when`, which Confluence emits either as RFC 3339 or with
/// a colon-less offset such as `+0000`.
pub(crate) fn parse_version_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, VERSION_WHEN_FORMAT))
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
