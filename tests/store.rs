use std::fs;

use camino::Utf8PathBuf;

use pathwaydb::annotation::StoreStats;
use pathwaydb::domain::{DatasetKey, DatasetKind};
use pathwaydb::store::{self, Manifest, Store};

fn manifest(key: &DatasetKey, path: &Utf8PathBuf) -> Manifest {
    Manifest {
        key: key.to_string(),
        kind: key.kind(),
        downloaded_at: "2024-06-01T08:00:00+00:00".to_string(),
        tool: store::tool_name(),
        resolved_path: path.to_string(),
        stats: StoreStats {
            total: 3,
            unique_genes: 2,
            unique_annotations: 3,
            missing_names: 0,
            groups: [("hsa".to_string(), 3)].into_iter().collect(),
        },
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join(".pathwaydb"), root.join("cache"));
    (temp, store)
}

#[test]
fn layout_paths() {
    let (_temp, store) = temp_store();
    let key: DatasetKey = "msigdb:mouse:C2".parse().unwrap();
    assert!(store.project_store_path(&key).ends_with(".pathwaydb/msigdb_mouse_c2.db"));
    assert!(
        store
            .project_manifest_path(&key)
            .ends_with(".pathwaydb/msigdb_mouse_c2.manifest.json")
    );
    assert!(store.cache_stores_dir().starts_with(store.cache_root()));
    assert!(store.responses_dir().starts_with(store.cache_root()));
}

#[test]
fn manifests_round_trip_and_list_sorted() {
    let (_temp, store) = temp_store();
    let go: DatasetKey = "go:human".parse().unwrap();
    let kegg: DatasetKey = "kegg:hsa".parse().unwrap();
    for key in [&kegg, &go] {
        let path = store.project_store_path(key);
        Store::write_manifest(&store.project_manifest_path(key), &manifest(key, &path)).unwrap();
    }
    fs::write(store.project_root().join("notes.txt").as_std_path(), "x").unwrap();

    let read = Store::read_manifest(&store.project_manifest_path(&go))
        .unwrap()
        .unwrap();
    assert_eq!(read.kind, DatasetKind::Go);
    assert_eq!(read.stats.groups.get("hsa"), Some(&3));

    let keys = Store::list_manifests(store.project_root())
        .unwrap()
        .into_iter()
        .map(|manifest| manifest.key)
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["go:human", "kegg:hsa"]);
}

#[test]
fn unreadable_manifest_is_ignored() {
    let (_temp, store) = temp_store();
    let key: DatasetKey = "go:human".parse().unwrap();
    let path = store.project_manifest_path(&key);
    Store::write_bytes_atomic(&path, b"{ truncated").unwrap();

    assert!(Store::read_manifest(&path).unwrap().is_none());
    assert!(Store::list_manifests(store.project_root()).unwrap().is_empty());
    assert!(
        Store::read_manifest(&store.project_manifest_path(&"kegg:hsa".parse().unwrap()))
            .unwrap()
            .is_none()
    );
}

#[test]
fn copy_replaces_destination_and_clear_removes_project() {
    let (temp, store) = temp_store();
    let source = Utf8PathBuf::from_path_buf(temp.path().join("source.db")).unwrap();
    fs::write(source.as_std_path(), b"new contents").unwrap();

    let dest = store.project_store_path(&"kegg:hsa".parse().unwrap());
    Store::write_bytes_atomic(&dest, b"old").unwrap();
    Store::copy_file_atomic(&source, &dest).unwrap();
    assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"new contents");

    store.clear_project().unwrap();
    assert!(!store.project_root().as_std_path().exists());
    store.clear_project().unwrap();
}
