// Hash computation module
// Streams file content through SHA-256 in fixed-size chunks

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ArchiveError;

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Hash computer with streaming I/O.
///
/// Reads in fixed-size chunks so memory stays bounded regardless of file
/// size, and never translates bytes, so digests are identical across
/// platforms.
pub struct HashComputer {
    buffer_size: usize,
}

impl HashComputer {
    /// Create a new HashComputer with the default buffer size (1 MiB)
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Create a new HashComputer with a custom buffer size
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    /// Compute the hex-encoded SHA-256 digest of a file's content.
    ///
    /// Fails with a per-file I/O error if the file becomes unreadable at any
    /// point; callers treat that as a skip-and-log condition, not a run
    /// abort.
    pub fn hash_file(&self, path: &Path) -> Result<String, ArchiveError> {
        let mut file = File::open(path).map_err(|e| {
            ArchiveError::from_io_error(e, "reading", Some(path.to_path_buf()))
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| {
                ArchiveError::from_io_error(e, "reading", Some(path.to_path_buf()))
            })?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(bytes_to_hex(&hasher.finalize()))
    }
}

impl Default for HashComputer {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert bytes to a lowercase hexadecimal string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
