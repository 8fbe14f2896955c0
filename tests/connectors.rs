use std::io::Write;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use pathwaydb::annotation::{Criteria, GoDb, KeggDb, MsigdbDb};
use pathwaydb::connectors::go::{QUICKGO_TERMS_URL, gaf_url};
use pathwaydb::connectors::kegg::KEGG_BASE_URL;
use pathwaydb::connectors::msigdb::gmt_url;
use pathwaydb::connectors::{Connectors, IngestOptions, KeggPathwayNames};
use pathwaydb::domain::{DatasetKey, GeneIdType};
use pathwaydb::error::PathwayError;
use pathwaydb::fetcher::HttpFetch;
use pathwaydb::terms::{DescriptionLookup, TermNames};

/// Answers by URL prefix and records every requested URL.
#[derive(Default)]
struct RoutedFetch {
    routes: Vec<(String, Vec<u8>)>,
    requested: Mutex<Vec<String>>,
}

impl RoutedFetch {
    fn route(mut self, prefix: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.push((prefix.to_string(), body.into()));
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl HttpFetch for RoutedFetch {
    fn fetch(&self, url: &str, _params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.routes
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| PathwayError::Request {
                url: url.to_string(),
                status: 404,
                message: "not found".to_string(),
            })
    }
}

const GAF: &str = "!gaf-version: 2.2\n\
UniProtKB\tP04637\tTP53\t\tGO:0006281\tPMID:1\tIDA\t\tP\tCellular tumor antigen p53\t\tprotein\ttaxon:9606\t20200101\tUniProt\t\t\n\
UniProtKB\tP04637\tTP53\t\tGO:0000001\tPMID:2\tIEA\t\tP\tCellular tumor antigen p53\t\tprotein\ttaxon:9606\t20200101\tUniProt\t\t\n\
UniProtKB\tP38398\tBRCA1\t\tGO:0005634\tPMID:3\tIEA\t\tC\tBreast cancer type 1\t\tprotein\ttaxon:9606\t20200101\tUniProt\t\t\n";

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn store_path(temp: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap()
}

fn connectors(fetch: Arc<RoutedFetch>, names: TermNames) -> Connectors {
    Connectors::new(fetch, Arc::new(names))
}

#[test]
fn kegg_ingest_joins_links_with_pathway_names() {
    let fetch = Arc::new(
        RoutedFetch::default()
            .route(
                &format!("{KEGG_BASE_URL}/link/pathway/hsa"),
                "hsa:7157\tpath:hsa04110\nhsa:7157\tpath:hsa04115\nhsa:672\tpath:hsa03440\n",
            )
            .route(
                &format!("{KEGG_BASE_URL}/list/pathway/hsa"),
                "path:hsa04110\tCell cycle - Homo sapiens (human)\nhsa04115\tp53 signaling pathway - Homo sapiens (human)\n",
            ),
    );
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "kegg_hsa.db");

    let report = connectors(fetch.clone(), TermNames::empty())
        .ingest(&DatasetKey::kegg("hsa").unwrap(), &path, &IngestOptions::default())
        .unwrap();
    assert_eq!(report.rows, 3);

    let db = KeggDb::open(&path).unwrap();
    let stats = db.stats().unwrap();
    assert_eq!(stats.unique_genes, 2);
    assert_eq!(stats.missing_names, 1);
    let tp53 = db.query_by_gene("hsa:7157", GeneIdType::Id).unwrap();
    assert_eq!(
        tp53[0].pathway_name.as_deref(),
        Some("Cell cycle - Homo sapiens (human)")
    );
    assert_eq!(tp53[0].gene_symbol, "7157");
    assert_eq!(db.get_metadata("kegg_organism").unwrap().as_deref(), Some("hsa"));
}

#[test]
fn kegg_ingest_without_descriptions_skips_name_list() {
    let fetch = Arc::new(RoutedFetch::default().route(
        &format!("{KEGG_BASE_URL}/link/pathway/mmu"),
        "mmu:22059\tpath:mmu04110\n",
    ));
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "kegg_mmu.db");
    let options = IngestOptions {
        fetch_descriptions: false,
        evidence_codes: None,
    };

    connectors(fetch.clone(), TermNames::empty())
        .ingest(&DatasetKey::kegg("mmu").unwrap(), &path, &options)
        .unwrap();
    assert_eq!(fetch.requested().len(), 1);
    assert_eq!(KeggDb::open(&path).unwrap().stats().unwrap().missing_names, 1);
}

#[test]
fn go_ingest_backfills_bundled_then_quickgo() {
    let fetch = Arc::new(
        RoutedFetch::default()
            .route(&gaf_url("human"), gzip(GAF))
            .route(
                QUICKGO_TERMS_URL,
                r#"{"results":[{"id":"GO:0000001","name":"mitochondrion inheritance"}]}"#,
            ),
    );
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "go_human.db");
    let mut names = TermNames::empty();
    names.insert("GO:0006281", "DNA repair");
    names.insert("GO:0005634", "nucleus");

    let report = connectors(fetch.clone(), names)
        .ingest(&DatasetKey::go("human").unwrap(), &path, &IngestOptions::default())
        .unwrap();
    assert_eq!(report.rows, 3);
    let backfill = report.backfill.unwrap();
    assert_eq!(backfill.from_bundled, 2);
    assert_eq!(backfill.from_lookup, 1);
    assert_eq!(backfill.unresolved, 0);

    assert_eq!(
        fetch.requested()[1],
        format!("{QUICKGO_TERMS_URL}/GO:0000001")
    );
    let db = GoDb::open(&path).unwrap();
    assert_eq!(db.stats().unwrap().missing_names, 0);
    assert_eq!(db.get_metadata("go_species").unwrap().as_deref(), Some("human"));
}

#[test]
fn go_ingest_applies_evidence_filter() {
    let fetch = Arc::new(RoutedFetch::default().route(&gaf_url("human"), GAF));
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "go_human.db");
    let options = IngestOptions {
        fetch_descriptions: false,
        evidence_codes: Some(vec!["IDA".to_string()]),
    };

    let report = connectors(fetch, TermNames::empty())
        .ingest(&DatasetKey::go("human").unwrap(), &path, &options)
        .unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(report.skipped, 2);
    assert!(report.backfill.is_none());
}

#[test]
fn msigdb_ingest_writes_one_row_per_member() {
    let url = gmt_url("human", "H").unwrap();
    let fetch = Arc::new(RoutedFetch::default().route(
        &url,
        "HALLMARK_APOPTOSIS\thttp://www.gsea-msigdb.org/gsea/msigdb/human/geneset/HALLMARK_APOPTOSIS\tTP53\tCASP3\tBAX\n\
HALLMARK_P53_PATHWAY\thttp://www.gsea-msigdb.org/gsea/msigdb/human/geneset/HALLMARK_P53_PATHWAY\tTP53\tMDM2\n",
    ));
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "msigdb_human_h.db");

    let report = connectors(fetch, TermNames::empty())
        .ingest(
            &DatasetKey::msigdb("human", "H").unwrap(),
            &path,
            &IngestOptions::default(),
        )
        .unwrap();
    assert_eq!(report.rows, 5);

    let db = MsigdbDb::open(&path).unwrap();
    let tp53 = db
        .filter(&Criteria::new().any_of("gene_symbols", ["TP53"]))
        .unwrap();
    assert_eq!(tp53.len(), 2);
    assert_eq!(db.stats().unwrap().groups.get("H"), Some(&5));
    assert_eq!(db.get_metadata("msigdb_collection").unwrap().as_deref(), Some("H"));
}

#[test]
fn remote_errors_propagate() {
    let fetch = Arc::new(RoutedFetch::default());
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp, "kegg_hsa.db");

    let err = connectors(fetch, TermNames::empty())
        .ingest(&DatasetKey::kegg("hsa").unwrap(), &path, &IngestOptions::default())
        .unwrap_err();
    assert_matches!(err, PathwayError::Request { status: 404, .. });
}

#[test]
fn kegg_name_lookup_downloads_the_list_once() {
    let fetch = Arc::new(RoutedFetch::default().route(
        &format!("{KEGG_BASE_URL}/list/pathway/hsa"),
        "path:hsa04110\tCell cycle\npath:hsa04115\tp53 signaling pathway\n",
    ));
    let lookup = KeggPathwayNames::new(fetch.clone(), "hsa");

    let first = lookup.lookup(&["hsa04110".to_string()]).unwrap();
    assert_eq!(first.get("hsa04110").map(String::as_str), Some("Cell cycle"));
    assert_eq!(first.len(), 1);
    let second = lookup
        .lookup(&["hsa04115".to_string(), "hsa99999".to_string()])
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(fetch.requested().len(), 1);
}
