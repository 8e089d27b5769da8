//! File-backed TTL cache for successful GET responses.
//!
//! Each entry lives in its own file named by the SHA-256 fingerprint of the
//! request identity (the full URL including its query string). Entries are
//! written to a temporary file in the cache directory and renamed into
//! place, so a reader sees either the previous entry or the new one. A file
//! that fails to decode is a miss, never an error.
//!
//! Operations on the same key are serialised through a per-key lock; distinct
//! keys proceed in parallel.

mod clock;
mod entry;
mod error;
mod key;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub use clock::{Clock, SystemClock};
pub use entry::CacheEntry;
pub use error::CacheError;
pub use key::fingerprint;

/// Time-to-live applied to every entry unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

const CACHE_DIR_NAME: &str = "atlas";

/// Response cache rooted at a directory.
pub struct ResponseCache {
    dir: Option<Utf8PathBuf>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Creates a cache storing entries under `dir`.
    ///
    /// The directory is created lazily on the first write.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>, ttl: Duration) -> Self {
        Self::with_dir(Some(dir.into()), ttl)
    }

    /// Creates a cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_dir(None, DEFAULT_TTL)
    }

    fn with_dir(dir: Option<Utf8PathBuf>, ttl: Duration) -> Self {
        Self {
            dir,
            ttl,
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the clock used to stamp and expire entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns `$XDG_CACHE_HOME/atlas`, falling back to the platform cache
    /// directory.
    #[must_use]
    pub fn default_dir() -> Option<Utf8PathBuf> {
        let base = env::var_os("XDG_CACHE_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::cache_dir)?;
        Utf8PathBuf::from_path_buf(base.join(CACHE_DIR_NAME)).ok()
    }

    /// Directory holding the entries, if caching is enabled.
    #[must_use]
    pub fn dir(&self) -> Option<&Utf8Path> {
        self.dir.as_deref()
    }

    /// Returns the cached payload for `identity` when present and fresh.
    ///
    /// Expired entries are removed as a side effect.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<Vec<u8>> {
        let dir = self.dir.as_ref()?;
        let key = fingerprint(identity);
        self.with_key_lock(&key, || self.read_fresh(&dir.join(&key)))
    }

    fn read_fresh(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    debug!(%path, %error, "cache entry unreadable");
                }
                return None;
            }
        };

        let Ok(entry) = serde_json::from_slice::<CacheEntry>(&raw) else {
            debug!(%path, "cache entry undecodable; treating as miss");
            return None;
        };

        if entry.is_expired(self.clock.now()) {
            debug!(%path, expires_at = %entry.expires_at, "cache entry expired");
            if let Err(error) = remove_if_present(path) {
                debug!(%path, %error, "failed to remove expired cache entry");
            }
            return None;
        }

        debug!(%path, "cache hit");
        Some(entry.payload)
    }

    /// Stores `payload` for `identity`, expiring after the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the directory cannot be created or the
    /// entry cannot be written. Callers treat this as non-fatal.
    pub fn set(&self, identity: &str, payload: &[u8]) -> Result<(), CacheError> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|error| CacheError::io("create directory", &error))?;

        let entry = CacheEntry::new(payload.to_vec(), self.clock.now(), self.ttl);
        let encoded = serde_json::to_vec(&entry).map_err(|error| CacheError::Encode {
            message: error.to_string(),
        })?;

        let key = fingerprint(identity);
        self.with_key_lock(&key, || publish(dir, &key, &encoded))
    }

    /// Removes the entry for `identity`. A missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the file exists but cannot be removed.
    pub fn delete(&self, identity: &str) -> Result<(), CacheError> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        let key = fingerprint(identity);
        self.with_key_lock(&key, || {
            remove_if_present(dir.join(&key)).map_err(|error| CacheError::io("delete entry", &error))
        })
    }

    /// Removes every entry in the cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the directory cannot be listed or an
    /// entry cannot be removed.
    pub fn clear(&self) -> Result<(), CacheError> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(CacheError::io("list directory", &error)),
        };

        for item in listing {
            let dir_entry = item.map_err(|error| CacheError::io("list directory", &error))?;
            let is_entry_file = dir_entry.file_type().is_ok_and(|kind| kind.is_file())
                && dir_entry
                    .file_name()
                    .to_str()
                    .is_some_and(key::is_fingerprint);
            if is_entry_file {
                remove_if_present(&dir_entry.path())
                    .map_err(|error| CacheError::io("clear entry", &error))?;
            }
        }
        Ok(())
    }

    /// Runs `action` while holding the lock for `key`.
    ///
    /// The table entry is dropped again once no other caller holds or waits
    /// on it, so the table only ever holds keys in active use.
    fn with_key_lock<T>(&self, key: &str, action: impl FnOnce() -> T) -> T {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.to_owned()).or_default())
        };
        let outcome = {
            let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
            action()
        };

        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if table
            .get(key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(key);
        }
        outcome
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Writes `encoded` to a temporary file in `dir` and renames it over the
/// entry for `key`.
fn publish(dir: &Utf8Path, key: &str, encoded: &[u8]) -> Result<(), CacheError> {
    let mut staged =
        NamedTempFile::new_in(dir).map_err(|error| CacheError::io("stage entry", &error))?;
    staged
        .write_all(encoded)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|error| CacheError::io("write entry", &error))?;
    staged
        .persist(dir.join(key))
        .map_err(|error| CacheError::io("publish entry", &error.error))?;
    Ok(())
}

fn remove_if_present(path: impl AsRef<std::path::Path>) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
