use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;
use serde::Deserialize;

use crate::annotation::{GoAnnotation, GoDb};
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;
use crate::terms::{DescriptionLookup, TermNames};

use super::{IngestOptions, IngestReport};

pub const GAF_BASE_URL: &str = "http://geneontology.org/gene-associations";
pub const QUICKGO_TERMS_URL: &str = "https://www.ebi.ac.uk/QuickGO/services/ontology/go/terms";

const GAF_MIN_COLUMNS: usize = 15;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn gaf_url(species: &str) -> String {
    format!("{GAF_BASE_URL}/goa_{species}.gaf.gz")
}

pub struct GoConnector<F: HttpFetch> {
    fetcher: F,
}

impl<F: HttpFetch> GoConnector<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn download_annotations(
        &self,
        db: &mut GoDb,
        species: &str,
        options: &IngestOptions,
        term_names: &TermNames,
    ) -> Result<IngestReport, PathwayError> {
        let bytes = self.fetcher.fetch(&gaf_url(species), &[])?;
        let parsed = parse_gaf(&bytes, options.evidence_codes.as_deref())?;
        let rows = db.bulk_upsert(&parsed.records)?;
        db.set_metadata("go_species", species)?;

        let backfill = if options.fetch_descriptions {
            let lookup = QuickGoTerms::new(&self.fetcher);
            Some(db.populate_descriptions(term_names, Some(&lookup))?)
        } else {
            None
        };
        Ok(IngestReport {
            rows,
            skipped: parsed.skipped,
            backfill,
        })
    }
}

#[derive(Debug, Default)]
pub struct GafParse {
    pub records: Vec<GoAnnotation>,
    /// Data lines dropped for being short, incomplete or filtered out.
    pub skipped: usize,
}

/// Parses a GAF 2.x payload, gzip-compressed or plain.
///
/// Within one payload the first line for a (gene, term) pair wins.
pub fn parse_gaf(bytes: &[u8], evidence_codes: Option<&[String]>) -> Result<GafParse, PathwayError> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&GZIP_MAGIC) {
        Box::new(MultiGzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };
    let allowed = evidence_codes.filter(|codes| !codes.is_empty()).map(|codes| {
        codes
            .iter()
            .map(|code| code.trim().to_ascii_uppercase())
            .collect::<HashSet<_>>()
    });

    let mut parsed = GafParse::default();
    let mut seen = HashSet::new();
    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|err| PathwayError::parse("GAF", err.to_string()))?;
        if line.starts_with('!') || line.trim().is_empty() {
            continue;
        }
        let columns = line.split('\t').collect::<Vec<_>>();
        if columns.len() < GAF_MIN_COLUMNS {
            parsed.skipped += 1;
            continue;
        }
        let gene_id = columns[1].trim();
        let go_id = columns[4].trim();
        let evidence_code = columns[6].trim();
        if gene_id.is_empty() || go_id.is_empty() {
            parsed.skipped += 1;
            continue;
        }
        if let Some(allowed) = &allowed {
            if !allowed.contains(&evidence_code.to_ascii_uppercase()) {
                parsed.skipped += 1;
                continue;
            }
        }
        if !seen.insert((gene_id.to_string(), go_id.to_string())) {
            continue;
        }
        parsed.records.push(GoAnnotation {
            gene_id: gene_id.to_string(),
            gene_symbol: columns[2].trim().to_string(),
            go_id: go_id.to_string(),
            term_name: None,
            evidence_code: evidence_code.to_string(),
            aspect: columns[8].trim().to_string(),
        });
    }
    Ok(parsed)
}

/// GO term names from the QuickGO ontology service.
pub struct QuickGoTerms<F: HttpFetch> {
    fetcher: F,
}

impl<F: HttpFetch> QuickGoTerms<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Deserialize)]
struct QuickGoResponse {
    #[serde(default)]
    results: Vec<QuickGoTerm>,
}

#[derive(Debug, Deserialize)]
struct QuickGoTerm {
    id: String,
    name: Option<String>,
}

impl<F: HttpFetch> DescriptionLookup for QuickGoTerms<F> {
    fn lookup(&self, ids: &[String]) -> Result<HashMap<String, String>, PathwayError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{QUICKGO_TERMS_URL}/{}", ids.join(","));
        let bytes = self.fetcher.fetch(&url, &[])?;
        parse_quickgo_terms(&bytes)
    }
}

pub fn parse_quickgo_terms(bytes: &[u8]) -> Result<HashMap<String, String>, PathwayError> {
    let response: QuickGoResponse = serde_json::from_slice(bytes)
        .map_err(|err| PathwayError::parse("QuickGO", err.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .filter_map(|term| term.name.map(|name| (term.id, name)))
        .collect())
}
