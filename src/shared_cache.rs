//! Process-independent cache of fully built annotation stores.
//!
//! Each dataset key owns `<root>/stores/<stem>.db` and a manifest beside it.
//! A store is built under a temporary directory inside `stores/` and renamed
//! into place, so readers see either the previous store or the new one. Two
//! processes refreshing the same key at once both build, and the last rename
//! wins; a reader racing a refresh may still open the older file.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

use crate::annotation::{self, AnnotationDb, AnnotationRecord};
use crate::clock::{Clock, SystemClock};
use crate::domain::DatasetKey;
use crate::error::PathwayError;
use crate::store::{self, Manifest, Store};

pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// Builds a complete store for a dataset at the given path.
pub trait DatasetBuilder: Send + Sync {
    fn build(&self, key: &DatasetKey, path: &Utf8Path) -> Result<(), PathwayError>;
}

#[derive(Clone)]
pub struct SharedCache {
    root: Utf8PathBuf,
    clock: Arc<dyn Clock>,
    max_age: Option<chrono::Duration>,
    builder: Option<Arc<dyn DatasetBuilder>>,
}

impl SharedCache {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            clock: Arc::new(SystemClock),
            max_age: Some(chrono::Duration::days(DEFAULT_MAX_AGE_DAYS)),
            builder: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `None` keeps published stores current forever.
    pub fn with_max_age(mut self, max_age: Option<chrono::Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Enables auto-download for `load_from_cache` and `copy_from_cache`.
    pub fn with_builder(mut self, builder: Arc<dyn DatasetBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn stores_dir(&self) -> Utf8PathBuf {
        self.root.join("stores")
    }

    pub fn store_path(&self, key: &DatasetKey) -> Utf8PathBuf {
        store::store_path_in(&self.stores_dir(), key)
    }

    pub fn manifest_path(&self, key: &DatasetKey) -> Utf8PathBuf {
        store::manifest_path_in(&self.stores_dir(), key)
    }

    pub fn is_cached(&self, key: &DatasetKey) -> bool {
        self.store_path(key).as_std_path().is_file()
    }

    pub fn manifest(&self, key: &DatasetKey) -> Result<Option<Manifest>, PathwayError> {
        Store::read_manifest(&self.manifest_path(key))
    }

    /// A store is current when its file exists and its manifest is younger
    /// than the maximum age. A store without a manifest is stale.
    pub fn is_fresh(&self, key: &DatasetKey) -> Result<bool, PathwayError> {
        if !self.is_cached(key) {
            return Ok(false);
        }
        let Some(manifest) = self.manifest(key)? else {
            return Ok(false);
        };
        let Some(max_age) = self.max_age else {
            return Ok(true);
        };
        let downloaded_at = match DateTime::parse_from_rfc3339(&manifest.downloaded_at) {
            Ok(at) => at.with_timezone(&Utc),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "manifest timestamp unreadable");
                return Ok(false);
            }
        };
        Ok(self.clock.now() - downloaded_at < max_age)
    }

    /// Returns the published store for `key`, building it first when it is
    /// missing, stale or `force_refresh` is set.
    pub fn download_to_cache<F>(
        &self,
        key: &DatasetKey,
        build_fn: F,
        force_refresh: bool,
    ) -> Result<Utf8PathBuf, PathwayError>
    where
        F: FnOnce(&Utf8Path) -> Result<(), PathwayError>,
    {
        let path = self.store_path(key);
        if !force_refresh && self.is_fresh(key)? {
            tracing::debug!(key = %key, %path, "shared cache hit");
            return Ok(path);
        }

        let stores_dir = self.stores_dir();
        fs::create_dir_all(stores_dir.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let build_dir = tempfile::Builder::new()
            .prefix(".build-")
            .tempdir_in(stores_dir.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let build_path = Utf8PathBuf::from_path_buf(
            build_dir.path().join(format!("{}.db", key.file_stem())),
        )
        .map_err(|_| PathwayError::Filesystem("invalid temp dir".to_string()))?;

        tracing::info!(key = %key, force_refresh, "building store");
        build_fn(&build_path)?;
        let stats = annotation::stats_for_path(key.kind(), &build_path)?;

        fs::rename(build_path.as_std_path(), path.as_std_path())
            .map_err(|err| PathwayError::Filesystem(format!("publish {path}: {err}")))?;
        let manifest = Manifest {
            key: key.to_string(),
            kind: key.kind(),
            downloaded_at: self.clock.now().to_rfc3339(),
            tool: store::tool_name(),
            resolved_path: path.to_string(),
            stats,
        };
        Store::write_manifest(&self.manifest_path(key), &manifest)?;
        tracing::info!(key = %key, %path, rows = manifest.stats.total, "published store");
        Ok(path)
    }

    /// Opens the cached store, building it through the configured builder
    /// when it is absent or stale.
    pub fn load_from_cache<R: AnnotationRecord>(
        &self,
        key: &DatasetKey,
    ) -> Result<AnnotationDb<R>, PathwayError> {
        check_kind::<R>(key)?;
        let path = self.ensure_available(key)?;
        AnnotationDb::open(&path)
    }

    /// Copies the cached store byte for byte to `destination` and opens the
    /// copy. The shared file is left untouched.
    pub fn copy_from_cache<R: AnnotationRecord>(
        &self,
        key: &DatasetKey,
        destination: &Utf8Path,
    ) -> Result<AnnotationDb<R>, PathwayError> {
        check_kind::<R>(key)?;
        let source = self.ensure_available(key)?;
        Store::copy_file_atomic(&source, destination)?;
        tracing::info!(key = %key, %destination, "copied store from shared cache");
        AnnotationDb::open(destination)
    }

    fn ensure_available(&self, key: &DatasetKey) -> Result<Utf8PathBuf, PathwayError> {
        if self.is_fresh(key)? {
            return Ok(self.store_path(key));
        }
        match &self.builder {
            Some(builder) => {
                self.download_to_cache(key, |path| builder.build(key, path), false)
            }
            None if self.is_cached(key) => {
                tracing::warn!(key = %key, "serving stale store; auto-download disabled");
                Ok(self.store_path(key))
            }
            None => Err(PathwayError::CacheMiss(key.to_string())),
        }
    }

    pub fn list(&self) -> Result<Vec<Manifest>, PathwayError> {
        Store::list_manifests(&self.stores_dir())
    }

    /// Deletes the store and manifest for `key`. Returns whether a store existed.
    pub fn remove(&self, key: &DatasetKey) -> Result<bool, PathwayError> {
        let existed = self.is_cached(key);
        for path in [self.store_path(key), self.manifest_path(key)] {
            if path.as_std_path().exists() {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
            }
        }
        Ok(existed)
    }
}

fn check_kind<R: AnnotationRecord>(key: &DatasetKey) -> Result<(), PathwayError> {
    if key.kind() != R::KIND {
        return Err(PathwayError::Validation(format!(
            "{key} is a {} dataset, not {}",
            key.kind(),
            R::KIND
        )));
    }
    Ok(())
}
