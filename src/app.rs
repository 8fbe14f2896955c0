use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::annotation::{AnyDb, BackfillReport, ExportTable, GoDb, StoreStats};
use crate::clock::{Clock, SystemClock};
use crate::config::{DatasetRequest, Settings};
use crate::connectors::{Connectors, IngestOptions, KeggPathwayNames, QuickGoTerms};
use crate::domain::{DatasetKey, GeneIdType};
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;
use crate::response_cache::ResponseCache;
use crate::shared_cache::SharedCache;
use crate::store::{self, Manifest, Store};
use crate::terms::{DescriptionLookup, TermNames};

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub force: bool,
    pub no_cache: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub key: String,
    pub kind: String,
    /// Where the project copy came from: "project", "cache" or "download".
    pub action: String,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
    pub rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub key: String,
    pub kind: String,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
    pub downloaded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub key: String,
    pub kind: String,
    pub project_path: Option<String>,
    pub cache_path: Option<String>,
    pub downloaded_at: Option<String>,
    pub tool: Option<String>,
    pub stats: StoreStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
    pub cache_cleared: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub key: String,
    pub path: String,
    pub count: usize,
    pub rows: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub key: String,
    pub path: String,
    pub stats: StoreStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillResult {
    pub key: String,
    pub path: String,
    pub report: BackfillReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponsesResult {
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Project-local stores backed by the shared cache.
#[derive(Clone)]
pub struct App {
    store: Store,
    cache: SharedCache,
    connectors: Connectors,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn new(
        store: Store,
        fetcher: Arc<dyn HttpFetch>,
        settings: &Settings,
        term_names: TermNames,
    ) -> Self {
        let connectors = Connectors::new(fetcher, Arc::new(term_names));
        let cache = SharedCache::new(store.cache_root().to_path_buf())
            .with_max_age(settings.cache_max_age)
            .with_builder(Arc::new(connectors.clone()));
        Self {
            store,
            cache,
            connectors,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = self.cache.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn shared_cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn fetch(
        &self,
        requests: &[DatasetRequest],
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, PathwayError> {
        let mut items = Vec::new();
        for request in requests {
            items.push(self.fetch_single(request, &options, sink)?);
        }
        Ok(FetchResult { items })
    }

    fn fetch_single(
        &self,
        request: &DatasetRequest,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, PathwayError> {
        let key = &request.key;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; dataset {key}"),
            elapsed: None,
        });
        if !options.dry_run {
            self.store.ensure_project_root()?;
        }

        let project_path = self.store.project_store_path(key);
        let cache_path = self.cache.store_path(key);
        let item = |action: &str, cache_path: Option<&Utf8Path>, rows: Option<u64>| FetchItemResult {
            key: key.to_string(),
            kind: key.kind().to_string(),
            action: action.to_string(),
            project_path: Some(project_path.to_string()),
            cache_path: cache_path.map(|path| path.to_string()),
            rows,
        };

        if !options.force && project_path.as_std_path().is_file() {
            sink.event(ProgressEvent {
                message: "phase=Store; already in project store".to_string(),
                elapsed: None,
            });
            let cached = self.cache.is_cached(key).then_some(cache_path.as_path());
            return Ok(item("project", cached, None));
        }

        if !options.force && !options.no_cache && self.cache.is_fresh(key)? {
            sink.event(ProgressEvent {
                message: "phase=Store; using cached dataset".to_string(),
                elapsed: None,
            });
            if options.dry_run {
                return Ok(item("cache", Some(&cache_path), None));
            }
            Store::copy_file_atomic(&cache_path, &project_path)?;
            self.narrow_project_copy(key, &request.options)?;
            let manifest = self.write_project_manifest(key)?;
            return Ok(item("cache", Some(&cache_path), Some(manifest.stats.total)));
        }

        let cache_target = (!options.no_cache).then_some(cache_path.as_path());
        if options.dry_run {
            return Ok(item("download", cache_target, None));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Download; {key}"),
            elapsed: None,
        });
        let start = Instant::now();
        if options.no_cache {
            self.build_into_project(key, &request.options)?;
        } else {
            // The shared store always holds the whole dataset; per-project
            // filters apply to the copy only.
            let shared_options = IngestOptions {
                evidence_codes: None,
                ..request.options.clone()
            };
            let published = self.cache.download_to_cache(
                key,
                |path| {
                    self.connectors
                        .ingest(key, path, &shared_options)
                        .map(|_| ())
                },
                options.force,
            )?;
            Store::copy_file_atomic(&published, &project_path)?;
            self.narrow_project_copy(key, &request.options)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Store; {key} ready"),
            elapsed: Some(start.elapsed()),
        });
        let manifest = self.write_project_manifest(key)?;
        Ok(item("download", cache_target, Some(manifest.stats.total)))
    }

    fn build_into_project(&self, key: &DatasetKey, options: &IngestOptions) -> Result<(), PathwayError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(".build-")
            .tempdir_in(self.store.project_root().as_std_path())
            .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        let temp_path = Utf8PathBuf::from_path_buf(
            temp_dir.path().join(format!("{}.db", key.file_stem())),
        )
        .map_err(|_| PathwayError::Filesystem("invalid temp dir".to_string()))?;
        self.connectors.ingest(key, &temp_path, options)?;
        fs::rename(
            temp_path.as_std_path(),
            self.store.project_store_path(key).as_std_path(),
        )
        .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn narrow_project_copy(&self, key: &DatasetKey, options: &IngestOptions) -> Result<(), PathwayError> {
        let (DatasetKey::Go { .. }, Some(codes)) = (key, &options.evidence_codes) else {
            return Ok(());
        };
        let mut db = GoDb::open(&self.store.project_store_path(key))?;
        db.retain_evidence_codes(codes)?;
        Ok(())
    }

    fn write_project_manifest(&self, key: &DatasetKey) -> Result<Manifest, PathwayError> {
        let path = self.store.project_store_path(key);
        let manifest = Manifest {
            key: key.to_string(),
            kind: key.kind(),
            downloaded_at: self.clock.now().to_rfc3339(),
            tool: store::tool_name(),
            resolved_path: path.to_string(),
            stats: AnyDb::open(key.kind(), &path)?.stats()?,
        };
        Store::write_manifest(&self.store.project_manifest_path(key), &manifest)?;
        Ok(manifest)
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, PathwayError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning stores".to_string(),
            elapsed: None,
        });

        let mut map = BTreeMap::<String, ListEntry>::new();
        for manifest in Store::list_manifests(self.store.project_root())? {
            let entry = map
                .entry(manifest.key.clone())
                .or_insert_with(|| list_entry(&manifest));
            entry.project_path = Some(manifest.resolved_path);
        }
        for manifest in self.cache.list()? {
            let entry = map
                .entry(manifest.key.clone())
                .or_insert_with(|| list_entry(&manifest));
            entry.cache_path = Some(manifest.resolved_path);
        }

        Ok(ListResult {
            datasets: map.into_values().collect(),
        })
    }

    pub fn info(&self, key: &DatasetKey, sink: &dyn ProgressSink) -> Result<InfoResult, PathwayError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {key}"),
            elapsed: None,
        });
        let project_manifest = Store::read_manifest(&self.store.project_manifest_path(key))?;
        let cache_manifest = self.cache.manifest(key)?;
        let path = self.resolve_store_path(key)?;
        let stats = AnyDb::open(key.kind(), &path)?.stats()?;

        let project_path = self.store.project_store_path(key);
        let cache_path = self.cache.store_path(key);
        let newest = project_manifest.as_ref().or(cache_manifest.as_ref());
        Ok(InfoResult {
            key: key.to_string(),
            kind: key.kind().to_string(),
            project_path: project_path
                .as_std_path()
                .is_file()
                .then(|| project_path.to_string()),
            cache_path: self.cache.is_cached(key).then(|| cache_path.to_string()),
            downloaded_at: newest.map(|manifest| manifest.downloaded_at.clone()),
            tool: newest.map(|manifest| manifest.tool.clone()),
            stats,
        })
    }

    /// Removes the project store directory, and the shared stores when asked.
    pub fn clear(&self, include_cache: bool, sink: &dyn ProgressSink) -> Result<ClearResult, PathwayError> {
        sink.event(ProgressEvent {
            message: "phase=Store; clearing project store".to_string(),
            elapsed: None,
        });
        self.store.clear_project()?;
        let stores_dir = self.cache.stores_dir();
        if include_cache && stores_dir.as_std_path().exists() {
            fs::remove_dir_all(stores_dir.as_std_path())
                .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        }
        Ok(ClearResult {
            cleared: true,
            cache_cleared: include_cache,
        })
    }

    pub fn query<S: AsRef<str>>(
        &self,
        key: &DatasetKey,
        pairs: &[S],
        limit: Option<usize>,
    ) -> Result<QueryResult, PathwayError> {
        let path = self.resolve_store_path(key)?;
        let rows = AnyDb::open(key.kind(), &path)?.filter_pairs(pairs, limit)?;
        Ok(QueryResult {
            key: key.to_string(),
            path: path.to_string(),
            count: rows.len(),
            rows,
        })
    }

    /// Rows for one gene, matched on its symbol or its source identifier.
    pub fn query_gene(
        &self,
        key: &DatasetKey,
        gene: &str,
        id_type: GeneIdType,
        limit: Option<usize>,
    ) -> Result<QueryResult, PathwayError> {
        let path = self.resolve_store_path(key)?;
        let mut rows = AnyDb::open(key.kind(), &path)?.gene_rows(gene, id_type)?;
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(QueryResult {
            key: key.to_string(),
            path: path.to_string(),
            count: rows.len(),
            rows,
        })
    }

    pub fn stats(&self, key: &DatasetKey) -> Result<StatsResult, PathwayError> {
        let path = self.resolve_store_path(key)?;
        let stats = AnyDb::open(key.kind(), &path)?.stats()?;
        Ok(StatsResult {
            key: key.to_string(),
            path: path.to_string(),
            stats,
        })
    }

    pub fn export(&self, key: &DatasetKey, limit: Option<usize>) -> Result<ExportTable, PathwayError> {
        let path = self.resolve_store_path(key)?;
        AnyDb::open(key.kind(), &path)?.export(limit)
    }

    /// Fills in missing names, offline first; `offline` skips the remote lookup.
    pub fn backfill(&self, key: &DatasetKey, offline: bool) -> Result<BackfillResult, PathwayError> {
        let path = self.resolve_store_path(key)?;
        let mut db = AnyDb::open(key.kind(), &path)?;
        let fetcher = self.connectors.fetcher().clone();
        let lookup: Option<Box<dyn DescriptionLookup>> = match key {
            _ if offline => None,
            DatasetKey::Kegg { organism } => Some(Box::new(KeggPathwayNames::new(fetcher, organism))),
            DatasetKey::Go { .. } => Some(Box::new(QuickGoTerms::new(fetcher))),
            DatasetKey::Msigdb { .. } => None,
        };
        let report = db.populate_descriptions(self.connectors.term_names(), lookup.as_deref())?;
        Ok(BackfillResult {
            key: key.to_string(),
            path: path.to_string(),
            report,
        })
    }

    /// Deletes every cached HTTP response.
    pub fn clear_responses(&self) -> Result<ClearResponsesResult, PathwayError> {
        let removed = ResponseCache::new(self.store.responses_dir()).clear()?;
        Ok(ClearResponsesResult { removed })
    }

    /// Project copy if present, otherwise the shared copy.
    fn resolve_store_path(&self, key: &DatasetKey) -> Result<Utf8PathBuf, PathwayError> {
        let project_path = self.store.project_store_path(key);
        if project_path.as_std_path().is_file() {
            return Ok(project_path);
        }
        if self.cache.is_cached(key) {
            return Ok(self.cache.store_path(key));
        }
        Err(PathwayError::DatasetNotFound(key.to_string()))
    }
}

fn list_entry(manifest: &Manifest) -> ListEntry {
    ListEntry {
        key: manifest.key.clone(),
        kind: manifest.kind.to_string(),
        project_path: None,
        cache_path: None,
        downloaded_at: Some(manifest.downloaded_at.clone()),
    }
}
