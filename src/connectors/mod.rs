//! Per-source download and parsing, built on [`HttpFetch`].

pub mod go;
pub mod kegg;
pub mod msigdb;

use std::sync::Arc;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::annotation::{BackfillReport, GoDb, KeggDb, MsigdbDb};
use crate::domain::DatasetKey;
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;
use crate::shared_cache::DatasetBuilder;
use crate::terms::TermNames;

pub use go::{GoConnector, QuickGoTerms};
pub use kegg::{KeggConnector, KeggPathwayNames};
pub use msigdb::MsigdbConnector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Resolve human-readable names while ingesting instead of leaving them
    /// for a later backfill.
    pub fetch_descriptions: bool,
    /// GO only: keep annotations with these evidence codes.
    pub evidence_codes: Option<Vec<String>>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            fetch_descriptions: true,
            evidence_codes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows: usize,
    pub skipped: usize,
    pub backfill: Option<BackfillReport>,
}

/// Builds any dataset key into a store file using the matching connector.
#[derive(Clone)]
pub struct Connectors {
    fetcher: Arc<dyn HttpFetch>,
    term_names: Arc<TermNames>,
    options: IngestOptions,
}

impl Connectors {
    pub fn new(fetcher: Arc<dyn HttpFetch>, term_names: Arc<TermNames>) -> Self {
        Self {
            fetcher,
            term_names,
            options: IngestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fetcher(&self) -> &Arc<dyn HttpFetch> {
        &self.fetcher
    }

    pub fn term_names(&self) -> &TermNames {
        &self.term_names
    }

    pub fn ingest(
        &self,
        key: &DatasetKey,
        path: &Utf8Path,
        options: &IngestOptions,
    ) -> Result<IngestReport, PathwayError> {
        let fetcher = self.fetcher.clone();
        let report = match key {
            DatasetKey::Kegg { organism } => {
                let mut db = KeggDb::open(path)?;
                KeggConnector::new(fetcher).download_annotations(&mut db, organism, options)?
            }
            DatasetKey::Go { species } => {
                let mut db = GoDb::open(path)?;
                GoConnector::new(fetcher).download_annotations(
                    &mut db,
                    species,
                    options,
                    &self.term_names,
                )?
            }
            DatasetKey::Msigdb {
                species,
                collection,
            } => {
                let mut db = MsigdbDb::open(path)?;
                MsigdbConnector::new(fetcher).download_annotations(&mut db, species, collection)?
            }
        };
        tracing::info!(key = %key, rows = report.rows, skipped = report.skipped, "ingested dataset");
        Ok(report)
    }
}

impl DatasetBuilder for Connectors {
    fn build(&self, key: &DatasetKey, path: &Utf8Path) -> Result<(), PathwayError> {
        self.ingest(key, path, &self.options).map(|_| ())
    }
}

/// Splits a payload into trimmed, non-empty lines.
pub(crate) fn payload_lines(source_name: &str, bytes: &[u8]) -> Result<Vec<String>, PathwayError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| PathwayError::parse(source_name, err.to_string()))?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}
