use std::collections::HashSet;

use crate::annotation::{MsigdbAnnotation, MsigdbDb};
use crate::error::PathwayError;
use crate::fetcher::HttpFetch;

use super::{IngestReport, payload_lines};

pub const MSIGDB_BASE_URL: &str = "https://data.broadinstitute.org/gsea-msigdb/msigdb/release";
pub const MSIGDB_RELEASE: &str = "2024.1";

/// GMT download for a collection; MSigDB publishes human (`Hs`) and mouse (`Mm`).
pub fn gmt_url(species: &str, collection: &str) -> Result<String, PathwayError> {
    let suffix = match species {
        "human" => "Hs",
        "mouse" => "Mm",
        other => {
            return Err(PathwayError::Validation(format!(
                "MSigDB has no gene sets for species {other}"
            )));
        }
    };
    let collection = collection.to_ascii_lowercase();
    Ok(format!(
        "{MSIGDB_BASE_URL}/{MSIGDB_RELEASE}.{suffix}/{collection}.all.v{MSIGDB_RELEASE}.{suffix}.symbols.gmt"
    ))
}

pub struct MsigdbConnector<F: HttpFetch> {
    fetcher: F,
}

impl<F: HttpFetch> MsigdbConnector<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn download_annotations(
        &self,
        db: &mut MsigdbDb,
        species: &str,
        collection: &str,
    ) -> Result<IngestReport, PathwayError> {
        let bytes = self.fetcher.fetch(&gmt_url(species, collection)?, &[])?;
        let (records, skipped) = parse_gmt(&bytes, collection, species)?;
        let rows = db.bulk_upsert(&records)?;
        db.set_metadata("msigdb_collection", &collection.to_ascii_uppercase())?;
        db.set_metadata("msigdb_release", MSIGDB_RELEASE)?;
        Ok(IngestReport {
            rows,
            skipped,
            backfill: None,
        })
    }
}

/// Parses `name\tdescription\tgene...` lines into one record per
/// (gene, gene set). Returns the records and the number of lines skipped.
pub fn parse_gmt(
    bytes: &[u8],
    collection: &str,
    organism: &str,
) -> Result<(Vec<MsigdbAnnotation>, usize), PathwayError> {
    let collection = collection.to_ascii_uppercase();
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in payload_lines("GMT", bytes)? {
        let fields = line.split('\t').map(str::trim).collect::<Vec<_>>();
        if fields.len() < 3 || fields[0].is_empty() {
            skipped += 1;
            continue;
        }
        let description = Some(fields[1])
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let mut seen = HashSet::new();
        for gene in fields[2..].iter().filter(|gene| !gene.is_empty()) {
            if !seen.insert(*gene) {
                continue;
            }
            records.push(MsigdbAnnotation {
                gene_symbol: gene.to_string(),
                gene_set_name: fields[0].to_string(),
                collection: collection.clone(),
                description: description.clone(),
                organism: organism.to_string(),
            });
        }
    }
    Ok((records, skipped))
}
