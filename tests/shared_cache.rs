use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{TimeZone, Utc};

use pathwaydb::annotation::{GoAnnotation, KeggAnnotation, KeggDb};
use pathwaydb::clock::ManualClock;
use pathwaydb::domain::DatasetKey;
use pathwaydb::error::PathwayError;
use pathwaydb::shared_cache::{DatasetBuilder, SharedCache};

fn record(gene: &str, pathway: &str) -> KeggAnnotation {
    KeggAnnotation {
        gene_id: format!("hsa:{gene}"),
        gene_symbol: gene.to_string(),
        pathway_id: pathway.to_string(),
        pathway_name: Some("Cell cycle".to_string()),
        organism: "hsa".to_string(),
    }
}

fn build_rows(path: &Utf8Path, count: usize) -> Result<(), PathwayError> {
    let mut db = KeggDb::open(path)?;
    let rows = (0..count)
        .map(|index| record(&format!("{}", 1000 + index), "hsa04110"))
        .collect::<Vec<_>>();
    db.bulk_upsert(&rows)?;
    Ok(())
}

#[derive(Default)]
struct CountingBuilder {
    builds: AtomicUsize,
}

impl DatasetBuilder for CountingBuilder {
    fn build(&self, _key: &DatasetKey, path: &Utf8Path) -> Result<(), PathwayError> {
        let build = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        build_rows(path, build)
    }
}

fn setup() -> (tempfile::TempDir, Arc<ManualClock>, SharedCache) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
    ));
    let cache = SharedCache::new(root)
        .with_clock(clock.clone())
        .with_max_age(Some(chrono::Duration::days(30)));
    (temp, clock, cache)
}

fn key() -> DatasetKey {
    DatasetKey::kegg("hsa").unwrap()
}

#[test]
fn publishes_store_and_manifest() {
    let (_temp, _clock, cache) = setup();
    let path = cache
        .download_to_cache(&key(), |path| build_rows(path, 3), false)
        .unwrap();

    assert_eq!(path, cache.store_path(&key()));
    assert!(cache.is_fresh(&key()).unwrap());
    let manifest = cache.manifest(&key()).unwrap().unwrap();
    assert_eq!(manifest.key, "kegg:hsa");
    assert_eq!(manifest.stats.total, 3);
    assert_eq!(manifest.downloaded_at, "2024-05-01T00:00:00+00:00");
    assert_eq!(cache.list().unwrap().len(), 1);
}

#[test]
fn fresh_store_is_not_rebuilt() {
    let (_temp, _clock, cache) = setup();
    cache
        .download_to_cache(&key(), |path| build_rows(path, 3), false)
        .unwrap();
    cache
        .download_to_cache(&key(), |_| panic!("fresh store must not be rebuilt"), false)
        .unwrap();

    cache
        .download_to_cache(&key(), |path| build_rows(path, 4), true)
        .unwrap();
    assert_eq!(cache.manifest(&key()).unwrap().unwrap().stats.total, 4);
}

#[test]
fn failed_build_keeps_previous_store() {
    let (_temp, _clock, cache) = setup();
    cache
        .download_to_cache(&key(), |path| build_rows(path, 3), false)
        .unwrap();

    let err = cache
        .download_to_cache(
            &key(),
            |path| {
                build_rows(path, 10)?;
                Err(PathwayError::Network {
                    url: "https://rest.kegg.jp/link/pathway/hsa".to_string(),
                    attempts: 4,
                    message: "connection reset".to_string(),
                })
            },
            true,
        )
        .unwrap_err();
    assert!(err.is_remote());

    let db: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(db.stats().unwrap().total, 3);
    let leftovers = std::fs::read_dir(cache.stores_dir().as_std_path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".build-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn missing_store_without_builder_is_cache_miss() {
    let (_temp, _clock, cache) = setup();
    assert_matches!(
        cache.load_from_cache::<KeggAnnotation>(&key()),
        Err(PathwayError::CacheMiss(_))
    );
}

#[test]
fn builder_runs_on_miss_and_when_stale() {
    let (_temp, clock, cache) = setup();
    let builder = Arc::new(CountingBuilder::default());
    let cache = cache.with_builder(builder.clone());

    let db: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(db.stats().unwrap().total, 1);
    drop(db);

    clock.advance(chrono::Duration::days(29));
    let _db: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(builder.builds.load(Ordering::SeqCst), 1);

    clock.advance(chrono::Duration::days(1));
    assert!(!cache.is_fresh(&key()).unwrap());
    let db: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(db.stats().unwrap().total, 2);
    assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
}

#[test]
fn stale_store_is_served_without_builder() {
    let (_temp, clock, cache) = setup();
    cache
        .download_to_cache(&key(), |path| build_rows(path, 2), false)
        .unwrap();
    clock.advance(chrono::Duration::days(90));

    let db: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(db.stats().unwrap().total, 2);
}

#[test]
fn no_max_age_never_goes_stale() {
    let (_temp, clock, cache) = setup();
    let cache = cache.with_max_age(None);
    cache
        .download_to_cache(&key(), |path| build_rows(path, 1), false)
        .unwrap();
    clock.advance(chrono::Duration::days(3650));
    assert!(cache.is_fresh(&key()).unwrap());
}

#[test]
fn copy_is_independent_of_shared_store() {
    let (temp, _clock, cache) = setup();
    cache
        .download_to_cache(&key(), |path| build_rows(path, 2), false)
        .unwrap();

    let destination = Utf8PathBuf::from_path_buf(temp.path().join("project/kegg_hsa.db")).unwrap();
    let mut copy: KeggDb = cache.copy_from_cache(&key(), &destination).unwrap();
    copy.bulk_upsert(&[record("9999", "hsa05200")]).unwrap();
    assert_eq!(copy.stats().unwrap().total, 3);

    let shared: KeggDb = cache.load_from_cache(&key()).unwrap();
    assert_eq!(shared.stats().unwrap().total, 2);
}

#[test]
fn wrong_record_type_for_key_is_rejected() {
    let (_temp, _clock, cache) = setup();
    assert_matches!(
        cache.load_from_cache::<GoAnnotation>(&key()),
        Err(PathwayError::Validation(_))
    );
}

#[test]
fn remove_deletes_store_and_manifest() {
    let (_temp, _clock, cache) = setup();
    cache
        .download_to_cache(&key(), |path| build_rows(path, 1), false)
        .unwrap();
    assert!(cache.remove(&key()).unwrap());
    assert!(!cache.is_cached(&key()));
    assert!(cache.manifest(&key()).unwrap().is_none());
    assert!(!cache.remove(&key()).unwrap());
}
