use std::collections::HashMap;
use std::sync::Mutex;

use crate::annotation::{KeggAnnotation, KeggDb};
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;
use crate::terms::DescriptionLookup;

use super::{IngestOptions, IngestReport, payload_lines};

pub const KEGG_BASE_URL: &str = "https://rest.kegg.jp";

pub struct KeggConnector<F: HttpFetch> {
    fetcher: F,
}

impl<F: HttpFetch> KeggConnector<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Pathway id (`hsa04110`) to name for one organism.
    pub fn pathway_names(&self, organism: &str) -> Result<HashMap<String, String>, PathwayError> {
        let bytes = self
            .fetcher
            .fetch(&format!("{KEGG_BASE_URL}/list/pathway/{organism}"), &[])?;
        parse_pathway_list(&bytes)
    }

    /// (gene id, pathway id) pairs for one organism.
    pub fn gene_links(&self, organism: &str) -> Result<Vec<(String, String)>, PathwayError> {
        let bytes = self
            .fetcher
            .fetch(&format!("{KEGG_BASE_URL}/link/pathway/{organism}"), &[])?;
        parse_gene_links(&bytes)
    }

    pub fn download_annotations(
        &self,
        db: &mut KeggDb,
        organism: &str,
        options: &IngestOptions,
    ) -> Result<IngestReport, PathwayError> {
        let links = self.gene_links(organism)?;
        let names = if options.fetch_descriptions {
            self.pathway_names(organism)?
        } else {
            HashMap::new()
        };

        let records = links
            .into_iter()
            .map(|(gene_id, pathway_id)| KeggAnnotation {
                gene_symbol: gene_symbol_from_id(&gene_id),
                pathway_name: names.get(&pathway_id).cloned(),
                organism: organism.to_string(),
                gene_id,
                pathway_id,
            })
            .collect::<Vec<_>>();

        let rows = db.bulk_upsert(&records)?;
        db.set_metadata("kegg_organism", organism)?;
        Ok(IngestReport {
            rows,
            skipped: 0,
            backfill: None,
        })
    }
}

/// Pathway names served by `list/pathway/{org}`, for description backfill.
///
/// The list is downloaded on the first lookup and reused for later batches.
pub struct KeggPathwayNames<F: HttpFetch> {
    connector: KeggConnector<F>,
    organism: String,
    names: Mutex<Option<HashMap<String, String>>>,
}

impl<F: HttpFetch> KeggPathwayNames<F> {
    pub fn new(fetcher: F, organism: &str) -> Self {
        Self {
            connector: KeggConnector::new(fetcher),
            organism: organism.to_string(),
            names: Mutex::new(None),
        }
    }
}

impl<F: HttpFetch> DescriptionLookup for KeggPathwayNames<F> {
    fn lookup(&self, ids: &[String]) -> Result<HashMap<String, String>, PathwayError> {
        let mut cached = self
            .names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let names = match cached.take() {
            Some(names) => names,
            None => self.connector.pathway_names(&self.organism)?,
        };
        let found = ids
            .iter()
            .filter_map(|id| names.get(id).map(|name| (id.clone(), name.clone())))
            .collect();
        *cached = Some(names);
        Ok(found)
    }
}

/// Parses `path:hsa00010\tGlycolysis / Gluconeogenesis - Homo sapiens (human)`.
/// Newer responses omit the `path:` prefix; both forms are accepted.
pub fn parse_pathway_list(bytes: &[u8]) -> Result<HashMap<String, String>, PathwayError> {
    let mut names = HashMap::new();
    for line in payload_lines("KEGG pathway list", bytes)? {
        let Some((id, name)) = line.split_once('\t') else {
            continue;
        };
        let id = strip_path_prefix(id.trim());
        let name = name.trim();
        if id.is_empty() || name.is_empty() {
            continue;
        }
        names.insert(id.to_string(), name.to_string());
    }
    Ok(names)
}

/// Parses `hsa:7157\tpath:hsa04110` link lines.
pub fn parse_gene_links(bytes: &[u8]) -> Result<Vec<(String, String)>, PathwayError> {
    let mut links = Vec::new();
    for line in payload_lines("KEGG pathway links", bytes)? {
        let mut parts = line.split('\t');
        let (Some(gene_id), Some(pathway_id)) = (parts.next(), parts.next()) else {
            continue;
        };
        let gene_id = gene_id.trim();
        let pathway_id = strip_path_prefix(pathway_id.trim());
        if gene_id.is_empty() || pathway_id.is_empty() {
            continue;
        }
        links.push((gene_id.to_string(), pathway_id.to_string()));
    }
    Ok(links)
}

fn strip_path_prefix(id: &str) -> &str {
    id.strip_prefix("path:").unwrap_or(id)
}

/// `hsa:7157` yields `7157`; ids without an organism prefix are kept whole.
pub fn gene_symbol_from_id(gene_id: &str) -> String {
    gene_id
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(gene_id)
        .to_string()
}
