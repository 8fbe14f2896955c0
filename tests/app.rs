use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use pathwaydb::app::{App, FetchOptions};
use pathwaydb::clock::ManualClock;
use pathwaydb::config::{DatasetRequest, Settings};
use pathwaydb::connectors::IngestOptions;
use pathwaydb::connectors::go::gaf_url;
use pathwaydb::connectors::kegg::KEGG_BASE_URL;
use pathwaydb::domain::{DatasetKey, GeneIdType};
use pathwaydb::error::PathwayError;
use pathwaydb::fetcher::HttpFetch;
use pathwaydb::output::JsonOutput;
use pathwaydb::store::Store;
use pathwaydb::terms::TermNames;

#[derive(Default)]
struct MockKegg {
    calls: Mutex<Vec<String>>,
}

impl MockKegg {
    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl HttpFetch for MockKegg {
    fn fetch(&self, url: &str, _params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        self.calls.lock().unwrap().push(url.to_string());
        if url == format!("{KEGG_BASE_URL}/link/pathway/hsa") {
            return Ok(b"hsa:7157\tpath:hsa04110\nhsa:7157\tpath:hsa04115\nhsa:672\tpath:hsa03440\n".to_vec());
        }
        if url == format!("{KEGG_BASE_URL}/list/pathway/hsa") {
            return Ok(b"path:hsa04110\tCell cycle\npath:hsa04115\tp53 signaling pathway\n".to_vec());
        }
        Err(PathwayError::Request {
            url: url.to_string(),
            status: 404,
            message: "not found".to_string(),
        })
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    fetch: Arc<MockKegg>,
    app: App,
}

fn fixture() -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join("project/.pathwaydb"), root.join("cache"));
    let fetch = Arc::new(MockKegg::default());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    let app = App::new(store, fetch.clone(), &Settings::default(), TermNames::empty())
        .with_clock(clock);
    Fixture {
        _temp: temp,
        fetch,
        app,
    }
}

fn kegg_request() -> Vec<DatasetRequest> {
    vec![DatasetRequest {
        key: DatasetKey::kegg("hsa").unwrap(),
        options: IngestOptions::default(),
    }]
}

#[test]
fn fetch_downloads_then_reuses_project_and_cache() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();

    let first = fx
        .app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(first.items[0].action, "download");
    assert_eq!(first.items[0].rows, Some(3));
    assert!(fx.app.store().project_store_path(&key).as_std_path().is_file());
    assert!(fx.app.shared_cache().is_cached(&key));
    assert_eq!(fx.fetch.calls(), 2);

    let second = fx
        .app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(second.items[0].action, "project");

    fx.app.clear(false, &JsonOutput).unwrap();
    let third = fx
        .app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(third.items[0].action, "cache");
    assert_eq!(third.items[0].rows, Some(3));
    assert_eq!(fx.fetch.calls(), 2);
}

#[test]
fn force_downloads_again() {
    let fx = fixture();
    fx.app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();
    let forced = fx
        .app
        .fetch(
            &kegg_request(),
            FetchOptions {
                force: true,
                ..FetchOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(forced.items[0].action, "download");
    assert_eq!(fx.fetch.calls(), 4);
}

#[test]
fn dry_run_touches_nothing() {
    let fx = fixture();
    let result = fx
        .app
        .fetch(
            &kegg_request(),
            FetchOptions {
                dry_run: true,
                ..FetchOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.items[0].action, "download");
    assert_eq!(result.items[0].rows, None);
    assert_eq!(fx.fetch.calls(), 0);
    assert!(!fx.app.store().project_root().as_std_path().exists());
}

#[test]
fn no_cache_builds_into_project_only() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();
    let result = fx
        .app
        .fetch(
            &kegg_request(),
            FetchOptions {
                no_cache: true,
                ..FetchOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.items[0].cache_path, None);
    assert!(fx.app.store().project_store_path(&key).as_std_path().is_file());
    assert!(!fx.app.shared_cache().is_cached(&key));
}

#[test]
fn list_and_info_report_locations() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();
    fx.app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();

    let list = fx.app.list(&JsonOutput).unwrap();
    assert_eq!(list.datasets.len(), 1);
    let entry = &list.datasets[0];
    assert_eq!(entry.key, "kegg:hsa");
    assert!(entry.project_path.is_some());
    assert!(entry.cache_path.is_some());
    assert_eq!(entry.downloaded_at.as_deref(), Some("2024-06-01T08:00:00+00:00"));

    let info = fx.app.info(&key, &JsonOutput).unwrap();
    assert_eq!(info.kind, "kegg");
    assert_eq!(info.stats.total, 3);
    assert_eq!(info.stats.unique_annotations, 3);
    assert!(info.tool.unwrap().starts_with("pathwaydb/"));

    assert_matches!(
        fx.app.info(&DatasetKey::go("human").unwrap(), &JsonOutput),
        Err(PathwayError::DatasetNotFound(_))
    );
}

#[test]
fn query_stats_and_export_read_the_project_store() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();
    fx.app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();

    let result = fx
        .app
        .query(&key, &["pathway_name=P53"], None)
        .unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.rows[0]["pathway_id"], "hsa04115");

    let by_id = fx
        .app
        .query_gene(&key, "hsa:7157", GeneIdType::Id, None)
        .unwrap();
    assert_eq!(by_id.count, 2);
    let by_symbol = fx
        .app
        .query_gene(&key, "7157", GeneIdType::Symbol, Some(1))
        .unwrap();
    assert_eq!(by_symbol.count, 1);
    assert_eq!(by_symbol.rows[0]["gene_id"], "hsa:7157");
    assert_eq!(
        fx.app
            .query_gene(&key, "hsa:7157", GeneIdType::Symbol, None)
            .unwrap()
            .count,
        0
    );

    let stats = fx.app.stats(&key).unwrap();
    assert_eq!(stats.stats.missing_names, 1);

    let table = fx.app.export(&key, Some(2)).unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.headers, vec!["GeneID", "PATH", "Annot"]);

    assert_matches!(
        fx.app.query(&key, &["bogus=1"], None),
        Err(PathwayError::Validation(_))
    );
}

#[test]
fn offline_backfill_reports_unresolved() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();
    fx.app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();
    let calls = fx.fetch.calls();

    let result = fx.app.backfill(&key, true).unwrap();
    assert_eq!(result.report.missing, 1);
    assert_eq!(result.report.unresolved, 1);
    assert_eq!(fx.fetch.calls(), calls);

    let online = fx.app.backfill(&key, false).unwrap();
    assert_eq!(online.report.lookup_batches, 1);
    assert_eq!(online.report.unresolved, 1);
}

#[test]
fn clear_with_cache_removes_shared_stores() {
    let fx = fixture();
    let key = DatasetKey::kegg("hsa").unwrap();
    fx.app
        .fetch(&kegg_request(), FetchOptions::default(), &JsonOutput)
        .unwrap();

    let result = fx.app.clear(true, &JsonOutput).unwrap();
    assert!(result.cache_cleared);
    assert!(!fx.app.shared_cache().is_cached(&key));
    assert_matches!(fx.app.stats(&key), Err(PathwayError::DatasetNotFound(_)));
    assert!(fx.app.list(&JsonOutput).unwrap().datasets.is_empty());
    assert_eq!(fx.app.clear_responses().unwrap().removed, 0);
}

const GAF: &str = "!gaf-version: 2.2\n\
UniProtKB\tP04637\tTP53\t\tGO:0006281\tPMID:1\tIDA\t\tP\tCellular tumor antigen p53\t\tprotein\ttaxon:9606\t20200101\tUniProt\t\t\n\
UniProtKB\tP38398\tBRCA1\t\tGO:0005634\tPMID:3\tIEA\t\tC\tBreast cancer type 1\t\tprotein\ttaxon:9606\t20200101\tUniProt\t\t\n";

struct GafOnly;

impl HttpFetch for GafOnly {
    fn fetch(&self, url: &str, _params: &[(&str, &str)]) -> Result<Vec<u8>, PathwayError> {
        if url == gaf_url("human") {
            return Ok(GAF.as_bytes().to_vec());
        }
        Err(PathwayError::Request {
            url: url.to_string(),
            status: 404,
            message: "not found".to_string(),
        })
    }
}

fn go_app(root: &Utf8PathBuf, project: &str) -> App {
    let store = Store::new_with_paths(root.join(project).join(".pathwaydb"), root.join("cache"));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    App::new(store, Arc::new(GafOnly), &Settings::default(), TermNames::empty()).with_clock(clock)
}

fn go_request(evidence_codes: Option<Vec<String>>) -> Vec<DatasetRequest> {
    vec![DatasetRequest {
        key: DatasetKey::go("human").unwrap(),
        options: IngestOptions {
            fetch_descriptions: false,
            evidence_codes,
        },
    }]
}

#[test]
fn evidence_filter_narrows_project_copy_not_shared_store() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let key = DatasetKey::go("human").unwrap();

    let filtered = go_app(&root, "a");
    let first = filtered
        .fetch(
            &go_request(Some(vec!["IDA".to_string()])),
            FetchOptions::default(),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(first.items[0].action, "download");
    assert_eq!(first.items[0].rows, Some(1));
    assert_eq!(
        filtered.shared_cache().manifest(&key).unwrap().unwrap().stats.total,
        2
    );

    let full = go_app(&root, "b");
    let second = full
        .fetch(&go_request(None), FetchOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(second.items[0].action, "cache");
    assert_eq!(second.items[0].rows, Some(2));

    let narrowed = go_app(&root, "c");
    let third = narrowed
        .fetch(
            &go_request(Some(vec!["iea".to_string()])),
            FetchOptions::default(),
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(third.items[0].action, "cache");
    assert_eq!(third.items[0].rows, Some(1));
    let rows = narrowed.query(&key, &["evidence_codes=IDA"], None).unwrap();
    assert_eq!(rows.count, 0);
}
