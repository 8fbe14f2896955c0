use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::annotation::StoreStats;
use crate::domain::{DatasetKey, DatasetKind};
use crate::error::PathwayError;

pub const CACHE_DIR_ENV: &str = "PATHWAYDB_CACHE_DIR";
pub const PROJECT_DIR: &str = ".pathwaydb";
const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Where project-local and shared store files live.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    /// Project root under the current directory; cache root from
    /// `PATHWAYDB_CACHE_DIR` or `~/.cache/pathwaydb`.
    pub fn new() -> Result<Self, PathwayError> {
        let cwd =
            std::env::current_dir().map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(PROJECT_DIR))
            .map_err(|_| PathwayError::Filesystem("invalid project path".to_string()))?;
        Ok(Self {
            project_root,
            cache_root: default_cache_root()?,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn with_cache_root(mut self, cache_root: Utf8PathBuf) -> Self {
        self.cache_root = cache_root;
        self
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn project_store_path(&self, key: &DatasetKey) -> Utf8PathBuf {
        store_path_in(&self.project_root, key)
    }

    pub fn project_manifest_path(&self, key: &DatasetKey) -> Utf8PathBuf {
        manifest_path_in(&self.project_root, key)
    }

    pub fn cache_stores_dir(&self) -> Utf8PathBuf {
        self.cache_root.join("stores")
    }

    pub fn responses_dir(&self) -> Utf8PathBuf {
        self.cache_root.join("responses")
    }

    pub fn ensure_project_root(&self) -> Result<(), PathwayError> {
        fs::create_dir_all(self.project_root.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))
    }

    pub fn clear_project(&self) -> Result<(), PathwayError> {
        if self.project_root.as_std_path().exists() {
            fs::remove_dir_all(self.project_root.as_std_path())
                .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_manifest(path: &Utf8Path, manifest: &Manifest) -> Result<(), PathwayError> {
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Reads a manifest; a missing or unparsable file yields `None`.
    pub fn read_manifest(path: &Utf8Path) -> Result<Option<Manifest>, PathwayError> {
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PathwayError::Filesystem(format!("read {path}: {err}"))),
        };
        match serde_json::from_str(&content) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) => {
                tracing::warn!(%path, error = %err, "ignoring unreadable manifest");
                Ok(None)
            }
        }
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PathwayError> {
        let parent = path
            .parent()
            .ok_or_else(|| PathwayError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".pathwaydb-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Copies `source` next to `dest` under a temporary name, then renames it
    /// over `dest`.
    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), PathwayError> {
        let parent = dest
            .parent()
            .ok_or_else(|| PathwayError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".pathwaydb-copy")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| PathwayError::Filesystem(format!("copy {source}: {err}")))?;
        temp.persist(dest.as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn list_manifests(root: &Utf8Path) -> Result<Vec<Manifest>, PathwayError> {
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in read_dir_files(root.as_std_path())? {
            let is_manifest = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(MANIFEST_SUFFIX))
                .unwrap_or(false);
            if !is_manifest {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|_| PathwayError::Filesystem("invalid manifest path".to_string()))?;
            if let Some(manifest) = Self::read_manifest(&path)? {
                entries.push(manifest);
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Describes one published store file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub key: String,
    pub kind: DatasetKind,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
    pub stats: StoreStats,
}

pub fn tool_name() -> String {
    format!("pathwaydb/{}", env!("CARGO_PKG_VERSION"))
}

pub fn store_path_in(root: &Utf8Path, key: &DatasetKey) -> Utf8PathBuf {
    root.join(format!("{}.db", key.file_stem()))
}

pub fn manifest_path_in(root: &Utf8Path, key: &DatasetKey) -> Utf8PathBuf {
    root.join(format!("{}{MANIFEST_SUFFIX}", key.file_stem()))
}

fn default_cache_root() -> Result<Utf8PathBuf, PathwayError> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Utf8PathBuf::from_path_buf(PathBuf::from(dir)).map_err(|_| {
            PathwayError::Filesystem(format!("{CACHE_DIR_ENV} is not valid UTF-8"))
        });
    }
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("pathwaydb")).ok()
        })
        .ok_or_else(|| PathwayError::Filesystem("unable to resolve cache directory".to_string()))
}

fn read_dir_files(root: &Path) -> Result<Vec<PathBuf>, PathwayError> {
    let entries = fs::read_dir(root).map_err(|err| PathwayError::Filesystem(err.to_string()))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            items.push(path);
        }
    }
    Ok(items)
}
