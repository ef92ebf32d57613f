// Manifest module
// Durable mapping from relative paths to integrity records

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::ArchiveError;
use crate::hasher::DIGEST_HEX_LEN;
use crate::path_utils;
use crate::probe::Mtime;

/// Column header; the first line of every manifest file
pub const MANIFEST_HEADER: &str = "relative_path,checksum,size,modified,generated_at";

/// Integrity record for one tracked file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IntegrityRecord {
    /// Root-relative path in portable form (always `/` separators)
    pub relative_path: String,
    /// Hex-encoded SHA-256 digest of content at last-hash time
    pub checksum: String,
    /// Byte count at last-hash time
    pub size: u64,
    /// Source filesystem mtime at last-hash time
    pub modified: Mtime,
    /// When this record's checksum was computed; audit only, never consulted
    /// by the re-hash decision
    pub generated_at: DateTime<Utc>,
}

/// Summary statistics over a manifest
#[derive(Debug, Clone, serde::Serialize)]
pub struct ManifestStats {
    pub file_count: usize,
    pub total_bytes: u64,
    pub last_generated: Option<DateTime<Utc>>,
}

/// Ordered mapping from relative path to integrity record.
///
/// Keys are unique portable paths, so iteration order is the canonical
/// lexicographic order used by reports.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Manifest {
    records: BTreeMap<String, IntegrityRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: IntegrityRecord) -> Option<IntegrityRecord> {
        self.records.insert(record.relative_path.clone(), record)
    }

    pub fn get(&self, relative_path: &str) -> Option<&IntegrityRecord> {
        self.records.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.records.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, IntegrityRecord> {
        self.records.iter()
    }

    /// Refresh the stored metadata of an existing record after an
    /// equal-digest rehash (content unchanged, size/mtime drifted)
    pub fn refresh_metadata(&mut self, relative_path: &str, size: u64, modified: Mtime) {
        if let Some(record) = self.records.get_mut(relative_path) {
            record.size = size;
            record.modified = modified;
        }
    }

    pub fn stats(&self) -> ManifestStats {
        ManifestStats {
            file_count: self.records.len(),
            total_bytes: self.records.values().map(|r| r.size).sum(),
            last_generated: self.records.values().map(|r| r.generated_at).max(),
        }
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a IntegrityRecord);
    type IntoIter = btree_map::Iter<'a, String, IntegrityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Advisory write lock over a manifest file.
///
/// Held for the duration of any pass that will rewrite the manifest; the
/// lock file is removed on drop. A lock left behind by a crashed run must be
/// removed manually.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Handler for reading and writing manifest files.
///
/// Owns the on-disk representation: a header row followed by one row per
/// tracked file. Saves go through a temporary sibling file and an atomic
/// rename, so a crash mid-write never leaves a truncated manifest behind.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Path of the advisory lock file guarding this manifest
    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Path of the temporary sibling used for atomic saves
    pub fn staging_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    /// Acquire the advisory write lock for this manifest.
    ///
    /// Uses create-new semantics on a `.lock` sibling, so two writing passes
    /// against the same manifest cannot interleave.
    pub fn lock(&self) -> Result<StoreLock, ArchiveError> {
        let lock_path = self.lock_path();
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => Ok(StoreLock { path: lock_path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(ArchiveError::LockHeld { path: lock_path })
            }
            Err(e) => Err(ArchiveError::from_io_error(
                e,
                "creating lock file",
                Some(lock_path),
            )),
        }
    }

    /// Load the manifest, validating every row.
    ///
    /// A malformed header or row is `ManifestCorrupt`; a corrupt manifest is
    /// never silently treated as empty.
    pub fn load(&self) -> Result<Manifest, ArchiveError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::ManifestNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => {
                return Err(ArchiveError::from_io_error(
                    e,
                    "opening manifest",
                    Some(self.path.clone()),
                ));
            }
        };
        let reader = BufReader::new(file);
        let mut lines = reader.lines().enumerate();

        match lines.next() {
            Some((_, Ok(header))) if header.trim_end() == MANIFEST_HEADER => {}
            Some((_, Ok(_))) | None => {
                return Err(self.corrupt(1, "missing or invalid header row"));
            }
            Some((_, Err(e))) => {
                return Err(ArchiveError::from_io_error(
                    e,
                    "reading manifest",
                    Some(self.path.clone()),
                ));
            }
        }

        let mut manifest = Manifest::new();
        for (index, line_result) in lines {
            let line_no = index + 1;
            let line = line_result.map_err(|e| {
                ArchiveError::from_io_error(e, "reading manifest", Some(self.path.clone()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = decode_record(&line).map_err(|reason| self.corrupt(line_no, &reason))?;
            if manifest.insert(record).is_some() {
                return Err(self.corrupt(line_no, "duplicate relative path"));
            }
        }
        Ok(manifest)
    }

    /// Write the manifest atomically: temporary sibling, fsync, then rename
    pub fn save(&self, manifest: &Manifest) -> Result<(), ArchiveError> {
        let tmp_path = self.staging_path();
        let tmp_file = File::create(&tmp_path).map_err(|e| {
            ArchiveError::from_io_error(e, "creating manifest", Some(tmp_path.clone()))
        })?;
        let mut writer = BufWriter::new(tmp_file);

        writeln!(writer, "{}", MANIFEST_HEADER)
            .and_then(|_| {
                for (_, record) in manifest {
                    encode_record(&mut writer, record)?;
                }
                writer.flush()
            })
            .map_err(|e| ArchiveError::from_io_error(e, "writing manifest", Some(tmp_path.clone())))?;

        writer
            .into_inner()
            .map_err(|e| {
                ArchiveError::from_io_error(e.into_error(), "writing manifest", Some(tmp_path.clone()))
            })?
            .sync_all()
            .map_err(|e| ArchiveError::from_io_error(e, "syncing manifest", Some(tmp_path.clone())))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ArchiveError::from_io_error(e, "replacing manifest", Some(self.path.clone()))
        })
    }

    fn corrupt(&self, line: usize, reason: &str) -> ArchiveError {
        ArchiveError::ManifestCorrupt {
            path: self.path.clone(),
            line,
            reason: reason.to_string(),
        }
    }
}

/// Write a single record row.
/// Format: `<relative_path>,<checksum>,<size>,<modified>,<generated_at>`
fn encode_record(writer: &mut impl Write, record: &IntegrityRecord) -> io::Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{}",
        record.relative_path,
        record.checksum,
        record.size,
        record.modified,
        record.generated_at.to_rfc3339()
    )
}

/// Parse a single record row.
///
/// The relative path is the first column and may itself contain commas, so
/// the four fixed trailing columns are split off from the right and the
/// remainder is the path. Any schema violation is an error, never a skip.
fn decode_record(line: &str) -> Result<IntegrityRecord, String> {
    let mut fields = line.rsplitn(5, ',');
    let generated_at_str = fields.next().unwrap_or("");
    let modified_str = fields.next().ok_or("expected 5 columns")?;
    let size_str = fields.next().ok_or("expected 5 columns")?;
    let checksum = fields.next().ok_or("expected 5 columns")?;
    let path_str = fields.next().ok_or("expected 5 columns")?;

    if path_str.is_empty() {
        return Err("empty relative path".to_string());
    }
    if checksum.len() != DIGEST_HEX_LEN || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("checksum '{}' is not a {}-char hex digest", checksum, DIGEST_HEX_LEN));
    }
    let size: u64 = size_str
        .parse()
        .map_err(|_| format!("invalid size '{}'", size_str))?;
    let modified: Mtime = modified_str.parse()?;
    let generated_at = DateTime::parse_from_rfc3339(generated_at_str)
        .map_err(|e| format!("invalid generated_at '{}': {}", generated_at_str, e))?
        .with_timezone(&Utc);

    Ok(IntegrityRecord {
        relative_path: path_utils::normalize_portable(path_str),
        checksum: checksum.to_lowercase(),
        size,
        modified,
        generated_at,
    })
}

/// Derive a sibling path with an extra extension (`manifest.csv` -> `manifest.csv.tmp`)
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
