// tests/local_store.rs
//
// Backup-before-mutation semantics: owner-only files, snapshot history,
// content-hash deduplication.

use n8n_cli::store::LocalStore;

#[test]
fn backup_writes_an_owner_only_file_with_the_expected_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path().join("state")).unwrap();

    let path = store
        .backup_workflow("update", "wf42", r#"{"name":"x"}"#)
        .unwrap();
    assert!(path.exists());

    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("update-wf42-"));
    assert!(file_name.ends_with(".json"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        r#"{"name":"x"}"#
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let mode = std::fs::metadata(&path).unwrap().mode() & 0o777;
        assert_eq!(mode, 0o600, "backup must be owner-only, was {mode:03o}");
        let dir_mode = std::fs::metadata(dir.path().join("state")).unwrap().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "state dir must be owner-only");
    }
}

#[test]
fn identical_consecutive_snapshots_are_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path().join("state")).unwrap();

    let first = store
        .backup_workflow("update", "wf1", r#"{"name":"same"}"#)
        .unwrap();
    let second = store
        .backup_workflow("update", "wf1", r#"{"name":"same"}"#)
        .unwrap();
    assert_eq!(first, second, "unchanged content reuses the backup");

    std::thread::sleep(std::time::Duration::from_millis(2));
    let third = store
        .backup_workflow("update", "wf1", r#"{"name":"different"}"#)
        .unwrap();
    assert_ne!(first, third);

    let history = store.list_snapshots("wf1").unwrap();
    assert_eq!(history.len(), 2, "two distinct snapshots recorded");
    // Newest first.
    assert_ne!(history[0].content_sha256, history[1].content_sha256);
}

#[test]
fn snapshot_history_is_scoped_per_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path().join("state")).unwrap();

    store.backup_workflow("update", "a", r#"{"v":1}"#).unwrap();
    store.backup_workflow("delete", "b", r#"{"v":2}"#).unwrap();

    let a = store.list_snapshots("a").unwrap();
    let b = store.list_snapshots("b").unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].operation, "update");
    assert_eq!(b[0].operation, "delete");
    assert!(store.list_snapshots("missing").unwrap().is_empty());
}

#[test]
fn store_survives_reopen_and_close_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("state");

    {
        let store = LocalStore::open(&root).unwrap();
        store.backup_workflow("update", "wf1", r#"{"n":1}"#).unwrap();
        store.close();
    }

    let store = LocalStore::open(&root).unwrap();
    let history = store.list_snapshots("wf1").unwrap();
    assert_eq!(history.len(), 1);
    store.close();
}
