// Metadata probe module
// Reads size and mtime without touching file content

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ArchiveError;

/// A filesystem modification timestamp at full platform precision.
///
/// Stored as whole seconds since the Unix epoch plus a nanosecond fraction.
/// Filesystems that only keep whole seconds report zero nanos; on such
/// volumes sub-second content changes are indistinguishable by metadata
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Mtime {
    pub secs: i64,
    pub nanos: u32,
}

impl Mtime {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_nanos()),
            // Pre-epoch timestamps: negate the distance below the epoch
            Err(e) => {
                let d = e.duration();
                Self::new(-(d.as_secs() as i64), d.subsec_nanos())
            }
        }
    }
}

impl fmt::Display for Mtime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

impl FromStr for Mtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs_str, nanos_str) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid mtime '{}': missing fraction", s))?;
        let secs: i64 = secs_str
            .parse()
            .map_err(|_| format!("invalid mtime seconds '{}'", secs_str))?;
        if nanos_str.is_empty() || nanos_str.len() > 9 || !nanos_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid mtime fraction '{}'", nanos_str));
        }
        // Right-pad short fractions: "5" means 500 ms, not 5 ns
        let mut padded = nanos_str.to_string();
        while padded.len() < 9 {
            padded.push('0');
        }
        let nanos: u32 = padded
            .parse()
            .map_err(|_| format!("invalid mtime fraction '{}'", nanos_str))?;
        Ok(Self::new(secs, nanos))
    }
}

/// Size and mtime of a file, read with a single stat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub modified: Mtime,
}

/// Trait for metadata probing.
///
/// The engines take a probe behind this seam so tests can pin metadata while
/// changing content underneath.
pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> Result<FileMeta, ArchiveError>;
}

/// Probe backed by the real filesystem
pub struct FsProber;

impl Prober for FsProber {
    fn probe(&self, path: &Path) -> Result<FileMeta, ArchiveError> {
        let metadata = fs::metadata(path).map_err(|e| {
            ArchiveError::from_io_error(e, "probing metadata of", Some(path.to_path_buf()))
        })?;
        let modified = metadata.modified().map_err(|e| {
            ArchiveError::from_io_error(e, "probing mtime of", Some(path.to_path_buf()))
        })?;
        Ok(FileMeta {
            size: metadata.len(),
            modified: Mtime::from_system_time(modified),
        })
    }
}
