// Centralized error handling module
// Provides context-rich error types for all archive operations

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for the integrity checker.
///
/// Per-file I/O failures are recoverable: the engines log them, count them,
/// and keep going. Every other variant is fatal and aborts a run before any
/// manifest mutation takes place.
#[derive(Debug)]
pub enum ArchiveError {
    /// Per-file I/O failure with context (recoverable at the file boundary)
    Io { path: Option<PathBuf>, operation: String, source: io::Error },

    /// Archive root missing or unreadable (fatal, checked before any work)
    RootInaccessible { path: PathBuf },

    /// No manifest exists where one was expected (fatal for verify)
    ManifestNotFound { path: PathBuf },

    /// Existing manifest is malformed; never treated as empty (fatal)
    ManifestCorrupt { path: PathBuf, line: usize, reason: String },

    /// Another pass holds the manifest write lock (fatal)
    LockHeld { path: PathBuf },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArchiveError::Io { path, operation, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error while {} {}: {}\n", operation, p.display(), source)?;
                } else {
                    write!(f, "I/O error while {}: {}\n", operation, source)?;
                }
                write!(f, "Suggestion: Check file permissions and disk space")
            }
            ArchiveError::RootInaccessible { path } => {
                write!(f, "Archive root is missing or unreadable: {}\n", path.display())?;
                write!(f, "Suggestion: Check that the archive path is correct and accessible")
            }
            ArchiveError::ManifestNotFound { path } => {
                write!(f, "Manifest file not found: {}\n", path.display())?;
                write!(f, "Suggestion: Generate a manifest first using the 'generate' command")
            }
            ArchiveError::ManifestCorrupt { path, line, reason } => {
                write!(f, "Manifest {} is corrupt at line {}: {}\n", path.display(), line, reason)?;
                write!(f, "Suggestion: Restore the manifest from a backup or regenerate it")
            }
            ArchiveError::LockHeld { path } => {
                write!(f, "Manifest is locked by another run: {}\n", path.display())?;
                write!(
                    f,
                    "Suggestion: Wait for the other pass to finish; remove {} manually if it is stale",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ArchiveError {
    /// Create an Io error with context about the operation and optional path
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        ArchiveError::Io {
            path,
            operation: operation.to_string(),
            source: err,
        }
    }

    /// Whether this error is a recoverable per-file failure
    pub fn is_per_file(&self) -> bool {
        matches!(self, ArchiveError::Io { .. })
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        ArchiveError::from_io_error(err, "unknown operation", None)
    }
}
