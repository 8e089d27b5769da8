//! On-disk representation of a cached response.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response body, base64 encoded on disk.
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
    /// After this instant the entry is never served.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Builds an entry stamped at `now` that expires after `ttl`.
    #[must_use]
    pub fn new(payload: Vec<u8>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let lifetime = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self {
            payload,
            cached_at: now,
            expires_at: now
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Returns true once `now` is strictly past the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

mod base64_payload {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
