// Tests for the manifest store: codec, atomic save, locking

use std::fs;

use chrono::{TimeZone, Utc};
use preserv::manifest::MANIFEST_HEADER;
use preserv::{ArchiveError, IntegrityRecord, Manifest, ManifestStore, Mtime};
use tempfile::tempdir;

fn sample_record(relative_path: &str, size: u64) -> IntegrityRecord {
    IntegrityRecord {
        relative_path: relative_path.to_string(),
        checksum: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            .to_string(),
        size,
        modified: Mtime::new(1_700_000_000, 123_456_789),
        generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
    }
}

#[test]
fn test_round_trip_is_exact() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(&dir.path().join("manifest.csv"));

    let mut manifest = Manifest::new();
    manifest.insert(sample_record("document1.txt", 24));
    manifest.insert(sample_record("subfolder/document3.txt", 36));
    manifest.insert(sample_record("path with spaces/file.txt", 1));
    manifest.insert(sample_record("odd,comma,name.txt", 7));

    store.save(&manifest).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded, manifest);
}

#[test]
fn test_header_row_is_written_first() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let store = ManifestStore::new(&path);

    let mut manifest = Manifest::new();
    manifest.insert(sample_record("a.txt", 5));
    store.save(&manifest).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().next().unwrap(), MANIFEST_HEADER);
}

#[test]
fn test_atomic_save_leaves_no_temporary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let store = ManifestStore::new(&path);

    store.save(&Manifest::new()).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("manifest.csv.tmp").exists());
}

#[test]
fn test_missing_manifest_is_not_found() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(&dir.path().join("manifest.csv"));

    match store.load() {
        Err(ArchiveError::ManifestNotFound { .. }) => {}
        other => panic!("Expected ManifestNotFound, got {:?}", other),
    }
}

#[test]
fn test_invalid_header_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    fs::write(&path, "this is not a manifest\n").unwrap();

    match ManifestStore::new(&path).load() {
        Err(ArchiveError::ManifestCorrupt { line: 1, .. }) => {}
        other => panic!("Expected ManifestCorrupt at line 1, got {:?}", other),
    }
}

#[test]
fn test_malformed_row_is_corrupt_not_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    fs::write(
        &path,
        format!("{}\na.txt,deadbeef,12\n", MANIFEST_HEADER),
    )
    .unwrap();

    match ManifestStore::new(&path).load() {
        Err(ArchiveError::ManifestCorrupt { line: 2, .. }) => {}
        other => panic!("Expected ManifestCorrupt at line 2, got {:?}", other),
    }
}

#[test]
fn test_short_checksum_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    fs::write(
        &path,
        format!(
            "{}\na.txt,deadbeef,12,1700000000.000000000,2024-01-15T12:00:00+00:00\n",
            MANIFEST_HEADER
        ),
    )
    .unwrap();

    match ManifestStore::new(&path).load() {
        Err(ArchiveError::ManifestCorrupt { line: 2, .. }) => {}
        other => panic!("Expected ManifestCorrupt, got {:?}", other),
    }
}

#[test]
fn test_duplicate_path_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let row = "a.txt,2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824,5,1700000000.000000000,2024-01-15T12:00:00+00:00";
    fs::write(&path, format!("{}\n{}\n{}\n", MANIFEST_HEADER, row, row)).unwrap();

    match ManifestStore::new(&path).load() {
        Err(ArchiveError::ManifestCorrupt { line: 3, .. }) => {}
        other => panic!("Expected ManifestCorrupt at line 3, got {:?}", other),
    }
}

#[test]
fn test_backslash_paths_normalize_on_load() {
    // Manifests written elsewhere may carry Windows separators
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let row = "sub\\inner.txt,2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824,5,1700000000.000000000,2024-01-15T12:00:00+00:00";
    fs::write(&path, format!("{}\n{}\n", MANIFEST_HEADER, row)).unwrap();

    let manifest = ManifestStore::new(&path).load().unwrap();
    assert!(manifest.contains("sub/inner.txt"));
}

#[test]
fn test_header_only_manifest_is_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    fs::write(&path, format!("{}\n", MANIFEST_HEADER)).unwrap();

    let manifest = ManifestStore::new(&path).load().unwrap();
    assert!(manifest.is_empty());
}

#[test]
fn test_lock_is_exclusive_until_dropped() {
    let dir = tempdir().unwrap();
    let store = ManifestStore::new(&dir.path().join("manifest.csv"));

    let guard = store.lock().unwrap();
    match store.lock() {
        Err(ArchiveError::LockHeld { .. }) => {}
        other => panic!("Expected LockHeld, got {:?}", other),
    }

    drop(guard);
    store.lock().unwrap();
}

#[test]
fn test_stats() {
    let mut manifest = Manifest::new();
    manifest.insert(sample_record("a.txt", 10));
    let mut newer = sample_record("b.txt", 20);
    newer.generated_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    manifest.insert(newer);

    let stats = manifest.stats();
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.total_bytes, 30);
    assert_eq!(
        stats.last_generated,
        Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    );
}
