// Configuration module
// Explicit settings struct supplied by the CLI layer; no process-wide state

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::activity_log::Severity;
use crate::error::ArchiveError;

pub const DEFAULT_MANIFEST_FILE: &str = "manifest.csv";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_LOG_FILE: &str = "integrity_log.txt";

/// Settings consumed by the engines.
///
/// Owned by the caller and passed in explicitly; persisted as JSON between
/// runs so the archive path survives restarts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the preserved tree
    pub archive_path: Option<PathBuf>,
    /// Absorb files found on disk but absent from the manifest during verify
    pub add_new_files: bool,
    /// Minimum severity persisted to the activity log
    pub log_level: Severity,
    /// Force a rehash of every file, bypassing the size+mtime policy
    pub deep_verify: bool,
    /// Worker pool size; defaults to available parallelism
    pub threads: Option<usize>,
    pub manifest_file: PathBuf,
    pub log_file: PathBuf,
    /// Completion time of the last successful pass
    pub last_run: Option<DateTime<Utc>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_path: None,
            add_new_files: false,
            log_level: Severity::Info,
            deep_verify: false,
            threads: None,
            manifest_file: PathBuf::from(DEFAULT_MANIFEST_FILE),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            last_run: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ArchiveError::from_io_error(
                    e,
                    "reading config",
                    Some(path.to_path_buf()),
                ));
            }
        };
        serde_json::from_str(&contents).map_err(|e| {
            ArchiveError::from_io_error(
                io::Error::new(io::ErrorKind::InvalidData, e),
                "parsing config",
                Some(path.to_path_buf()),
            )
        })
    }

    /// Persist configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            ArchiveError::from_io_error(
                io::Error::new(io::ErrorKind::InvalidData, e),
                "encoding config",
                Some(path.to_path_buf()),
            )
        })?;
        fs::write(path, contents).map_err(|e| {
            ArchiveError::from_io_error(e, "writing config", Some(path.to_path_buf()))
        })
    }

    /// Resolved worker pool size
    pub fn worker_threads(&self) -> usize {
        self.threads.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }
}
