//! Content-addressed on-disk cache of raw HTTP response bodies.
//!
//! Entries are keyed by a SHA-256 of the request URL plus its sorted query
//! parameters, and hold a one-line JSON header followed by the body bytes.
//! Every write goes to a temporary file in the entry's directory and is
//! renamed into place, which is the only coordination between processes
//! sharing a cache directory.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::{Clock, SystemClock};
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;

const ENTRY_EXT: &str = "bin";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    url: String,
    fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResponseCache {
    root: Utf8PathBuf,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: Utf8PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { root, clock }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Request identity: the URL followed by its parameters sorted by key, then value.
    pub fn normalized_request(url: &str, params: &[(&str, &str)]) -> String {
        let mut pairs = params
            .iter()
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect::<Vec<_>>();
        pairs.sort();
        let url = url.trim();
        if pairs.is_empty() {
            return url.to_string();
        }
        let query = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{url}?{query}")
    }

    pub fn cache_key(url: &str, params: &[(&str, &str)]) -> String {
        let digest = Sha256::digest(Self::normalized_request(url, params).as_bytes());
        format!("{digest:x}")
    }

    pub fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.root
            .join(&key[..2.min(key.len())])
            .join(format!("{key}.{ENTRY_EXT}"))
    }

    /// Reads an entry regardless of age. Unreadable entries count as absent.
    pub fn read(&self, url: &str, params: &[(&str, &str)]) -> Result<Option<CachedResponse>, PathwayError> {
        let path = self.entry_path(&Self::cache_key(url, params));
        let raw = match fs::read(path.as_std_path()) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PathwayError::Filesystem(format!("read {path}: {err}"))),
        };
        match decode_entry(&raw) {
            Some(entry) => Ok(Some(entry)),
            None => {
                tracing::warn!(%path, "ignoring malformed response cache entry");
                Ok(None)
            }
        }
    }

    /// Returns the cached body if it is younger than `ttl`.
    pub fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<Option<Vec<u8>>, PathwayError> {
        let Some(entry) = self.read(url, params)? else {
            return Ok(None);
        };
        if self.is_fresh(entry.fetched_at, ttl) {
            Ok(Some(entry.body))
        } else {
            Ok(None)
        }
    }

    pub fn put(&self, url: &str, params: &[(&str, &str)], body: &[u8]) -> Result<(), PathwayError> {
        let path = self.entry_path(&Self::cache_key(url, params));
        let parent = path
            .parent()
            .ok_or_else(|| PathwayError::Filesystem(format!("invalid cache path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;

        let header = EntryHeader {
            url: Self::normalized_request(url, params),
            fetched_at: self.clock.now().to_rfc3339(),
        };
        let mut header_line = serde_json::to_vec(&header)
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        header_line.push(b'\n');

        let mut temp = tempfile::Builder::new()
            .prefix(".entry")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        temp.write_all(&header_line)
            .and_then(|_| temp.write_all(body))
            .and_then(|_| temp.flush())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn get_or_fetch<F>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        fetch_fn: F,
        ttl: Duration,
    ) -> Result<Vec<u8>, PathwayError>
    where
        F: FnOnce() -> Result<Vec<u8>, PathwayError>,
    {
        if let Some(body) = self.get(url, params, ttl)? {
            tracing::debug!(%url, "response cache hit");
            return Ok(body);
        }
        tracing::debug!(%url, "response cache miss");
        let body = fetch_fn()?;
        self.put(url, params, &body)?;
        Ok(body)
    }

    /// Removes every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, PathwayError> {
        self.remove_where(|_| true)
    }

    /// Removes entries older than `ttl`, plus malformed ones.
    pub fn prune(&self, ttl: Duration) -> Result<usize, PathwayError> {
        self.remove_where(|raw| match decode_entry(raw) {
            Some(entry) => !self.is_fresh(entry.fetched_at, ttl),
            None => true,
        })
    }

    /// A ttl reaching past the representable date range never expires.
    fn is_fresh(&self, fetched_at: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
        {
            Some(expires_at) => self.clock.now() < expires_at,
            None => true,
        }
    }

    fn remove_where(&self, should_remove: impl Fn(&[u8]) -> bool) -> Result<usize, PathwayError> {
        if !self.root.as_std_path().exists() {
            return Ok(0);
        }
        let mut removed = 0usize;
        for shard in read_dir(self.root.as_std_path())? {
            if !shard.is_dir() {
                continue;
            }
            for path in read_dir(&shard)? {
                let is_entry = path.extension().map(|ext| ext == ENTRY_EXT).unwrap_or(false);
                if !is_entry {
                    continue;
                }
                let raw = fs::read(&path).map_err(|err| PathwayError::Filesystem(err.to_string()))?;
                if should_remove(&raw) {
                    fs::remove_file(&path)
                        .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
                    removed += 1;
                }
            }
        }
        tracing::info!(root = %self.root, removed, "pruned response cache");
        Ok(removed)
    }
}

fn read_dir(path: &std::path::Path) -> Result<Vec<std::path::PathBuf>, PathwayError> {
    let entries = fs::read_dir(path).map_err(|err| PathwayError::Filesystem(err.to_string()))?;
    entries
        .map(|entry| {
            entry
                .map(|entry| entry.path())
                .map_err(|err| PathwayError::Filesystem(err.to_string()))
        })
        .collect()
}

fn decode_entry(raw: &[u8]) -> Option<CachedResponse> {
    let split = raw.iter().position(|byte| *byte == b'\n')?;
    let header: EntryHeader = serde_json::from_slice(&raw[..split]).ok()?;
    let fetched_at = DateTime::parse_from_rfc3339(&header.fetched_at)
        .ok()?
        .with_timezone(&Utc);
    Some(CachedResponse {
        body: raw[split + 1..].to_vec(),
        fetched_at,
    })
}

/// Serves requests from a [`ResponseCache`], falling back to `inner`.
pub struct CachedFetcher<F: HttpFetch> {
    inner: F,
    cache: ResponseCache,
    ttl: Duration,
}

impl<F: HttpFetch> CachedFetcher<F> {
    pub fn new(inner: F, cache: ResponseCache, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

impl<F: HttpFetch> HttpFetch for CachedFetcher<F> {
    fn fetch(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        self.cache
            .get_or_fetch(url, params, || self.inner.fetch(url, params), self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_param_order() {
        let a = ResponseCache::cache_key("https://rest.kegg.jp/list", &[("b", "2"), ("a", "1")]);
        let b = ResponseCache::cache_key("https://rest.kegg.jp/list", &[("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_depends_on_url() {
        let a = ResponseCache::cache_key("https://rest.kegg.jp/list/pathway/hsa", &[]);
        let b = ResponseCache::cache_key("https://rest.kegg.jp/list/pathway/mmu", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_entry_is_not_decoded() {
        assert!(decode_entry(b"no header here").is_none());
        assert!(decode_entry(b"{\"url\":\"x\"}\nbody").is_none());
    }
}
