// Activity log module
// Append-only record of operations and outcomes, shared across workers

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::error::ArchiveError;

/// Log severity, ordered so a minimum level can gate persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// One log line: timestamp, severity, message.
///
/// Owned exclusively by the log once emitted; nothing mutates an entry after
/// it is appended.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.timestamp.to_rfc3339(),
            self.severity.label(),
            self.message
        )
    }
}

/// Append-only activity log.
///
/// Appends are serialized behind a mutex, and the timestamp is taken while
/// the lock is held, so the line order always matches the real completion
/// order of the operations that emitted them. WARNING and ERROR entries are
/// mirrored to stderr. The engines write to the log but never read it back.
pub struct ActivityLog {
    writer: Mutex<BufWriter<File>>,
    min_level: Severity,
    path: PathBuf,
}

impl ActivityLog {
    /// Open (or create) a log file for appending
    pub fn open(path: &Path, min_level: Severity) -> Result<Self, ArchiveError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ArchiveError::from_io_error(e, "opening log", Some(path.to_path_buf())))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            min_level,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(Severity::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.append(Severity::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.append(Severity::Error, message.as_ref());
    }

    fn append(&self, level: Severity, message: &str) {
        if level >= Severity::Warning {
            eprintln!("{}: {}", level.label(), message);
        }
        if level < self.min_level {
            return;
        }
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            // A worker panicked mid-append; the log stays usable
            Err(poisoned) => poisoned.into_inner(),
        };
        // Timestamp taken under the lock: line order == completion order
        let entry = LogEntry {
            timestamp: Local::now(),
            severity: level,
            message: message.to_string(),
        };
        // Logging must never take down a run; a failed append is dropped
        let _ = writeln!(writer, "{}", entry);
        let _ = writer.flush();
    }

    /// Read the last `lines` lines of a log file for display or export
    pub fn tail(path: &Path, lines: usize) -> Result<String, ArchiveError> {
        let file = File::open(path).map_err(|e| {
            ArchiveError::from_io_error(e, "reading log", Some(path.to_path_buf()))
        })?;
        let all: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| ArchiveError::from_io_error(e, "reading log", Some(path.to_path_buf())))?;
        let start = all.len().saturating_sub(lines);
        let mut out = all[start..].join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}
