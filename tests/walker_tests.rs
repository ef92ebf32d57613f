// Tests for the tree walker

use std::fs;
use std::path::Path;

use preserv::{ActivityLog, ArchiveError, Severity, TreeWalker};
use tempfile::{tempdir, TempDir};

fn create_test_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// Log lives outside the walked root so it never shows up in enumerations
fn open_log() -> (TempDir, ActivityLog) {
    let dir = tempdir().unwrap();
    let log = ActivityLog::open(&dir.path().join("walker_test.log"), Severity::Info).unwrap();
    (dir, log)
}

#[test]
fn test_enumeration_is_sorted_and_recursive() {
    let dir = tempdir().unwrap();
    let (_logdir, log) = open_log();
    create_test_file(&dir.path().join("b.txt"), b"b");
    create_test_file(&dir.path().join("a.txt"), b"a");
    create_test_file(&dir.path().join("sub/inner.txt"), b"inner");
    create_test_file(&dir.path().join("sub/deeper/leaf.txt"), b"leaf");

    let walker = TreeWalker::new(dir.path()).unwrap();
    let relatives: Vec<String> = walker
        .collect(&log)
        .into_iter()
        .map(|f| f.relative)
        .collect();

    assert_eq!(
        relatives,
        vec!["a.txt", "b.txt", "sub/deeper/leaf.txt", "sub/inner.txt"]
    );
}

#[test]
fn test_two_walks_enumerate_identically() {
    let dir = tempdir().unwrap();
    let (_logdir, log) = open_log();
    create_test_file(&dir.path().join("one.txt"), b"1");
    create_test_file(&dir.path().join("nested/two.txt"), b"2");
    create_test_file(&dir.path().join("nested/three.txt"), b"3");

    let walker = TreeWalker::new(dir.path()).unwrap();
    let first = walker.collect(&log);
    let second = walker.collect(&log);

    assert_eq!(first, second);
}

#[test]
fn test_excluded_artifacts_are_skipped() {
    let dir = tempdir().unwrap();
    let (_logdir, log) = open_log();
    create_test_file(&dir.path().join("data.txt"), b"data");
    create_test_file(&dir.path().join("manifest.csv"), b"header");

    let walker = TreeWalker::new(dir.path())
        .unwrap()
        .exclude(&dir.path().join("manifest.csv"));
    let relatives: Vec<String> = walker
        .collect(&log)
        .into_iter()
        .map(|f| f.relative)
        .collect();

    assert_eq!(relatives, vec!["data.txt"]);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_enumerated() {
    let dir = tempdir().unwrap();
    let (_logdir, log) = open_log();
    create_test_file(&dir.path().join("real.txt"), b"real");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();

    let walker = TreeWalker::new(dir.path()).unwrap();
    let relatives: Vec<String> = walker
        .collect(&log)
        .into_iter()
        .map(|f| f.relative)
        .collect();

    assert_eq!(relatives, vec!["real.txt"]);
}

#[test]
fn test_missing_root_is_inaccessible() {
    let dir = tempdir().unwrap();

    match TreeWalker::new(&dir.path().join("nowhere")) {
        Err(ArchiveError::RootInaccessible { .. }) => {}
        other => panic!("Expected RootInaccessible, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_file_root_is_inaccessible() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, b"not a directory").unwrap();

    match TreeWalker::new(&file) {
        Err(ArchiveError::RootInaccessible { .. }) => {}
        other => panic!("Expected RootInaccessible, got {:?}", other.map(|_| ())),
    }
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_does_not_abort() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let (_logdir, log) = open_log();
    create_test_file(&dir.path().join("ok.txt"), b"ok");
    create_test_file(&dir.path().join("locked/secret.txt"), b"secret");
    let locked = dir.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let walker = TreeWalker::new(dir.path()).unwrap();
    let relatives: Vec<String> = walker
        .collect(&log)
        .into_iter()
        .map(|f| f.relative)
        .collect();

    // The rest of the tree is still enumerated. When running with enough
    // privilege the locked directory is readable anyway, so only the
    // accessible file is asserted.
    assert!(relatives.contains(&"ok.txt".to_string()));

    // Restore permissions so the tempdir can be removed
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}
