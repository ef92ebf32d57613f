// Tree walker module
// Deterministic enumeration of regular files under an archive root

use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use jwalk::WalkDir;

use crate::activity_log::ActivityLog;
use crate::cancel::CancelToken;
use crate::error::ArchiveError;
use crate::path_utils;

/// One file produced by a walk: portable relative path plus the absolute
/// path used for I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub relative: String,
    pub path: PathBuf,
}

/// Walker over the regular files beneath an archive root.
///
/// Each invocation restarts from the root. Enumeration is sorted, so two
/// walks over an unchanged tree produce the same sequence. Directories,
/// symlinks, and the engine's own artifact files (manifest, log, config) are
/// excluded; entries that cannot be traversed are skipped with a logged
/// warning rather than aborting the walk.
pub struct TreeWalker {
    root: PathBuf,
    excluded: Vec<PathBuf>,
}

impl TreeWalker {
    /// Create a walker, verifying the root up front.
    ///
    /// A missing or unreadable root is fatal before any work starts.
    pub fn new(root: &Path) -> Result<Self, ArchiveError> {
        let metadata = fs::metadata(root).map_err(|_| ArchiveError::RootInaccessible {
            path: root.to_path_buf(),
        })?;
        if !metadata.is_dir() {
            return Err(ArchiveError::RootInaccessible {
                path: root.to_path_buf(),
            });
        }
        let root = root.canonicalize().map_err(|_| ArchiveError::RootInaccessible {
            path: root.to_path_buf(),
        })?;
        Ok(Self {
            root,
            excluded: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exclude an artifact file (manifest, log, config) from enumeration
    pub fn exclude(mut self, path: &Path) -> Self {
        self.excluded.push(path_utils::absolutize(path));
        self
    }

    /// Stream walked files into a channel as they are discovered.
    ///
    /// The producer half of the generate pipeline: blocks on a full channel
    /// (backpressure) and stops early on cancellation or when the receiver
    /// goes away.
    pub fn stream(&self, sender: Sender<WalkedFile>, cancel: &CancelToken, log: &ActivityLog) {
        for file in self.iter_files(log) {
            if cancel.is_cancelled() {
                break;
            }
            if sender.send(file).is_err() {
                break;
            }
        }
    }

    /// Collect every walked file, sorted by relative path
    pub fn collect(&self, log: &ActivityLog) -> Vec<WalkedFile> {
        let mut files: Vec<WalkedFile> = self.iter_files(log).collect();
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        files
    }

    fn iter_files<'a>(&'a self, log: &'a ActivityLog) -> impl Iterator<Item = WalkedFile> + 'a {
        WalkDir::new(&self.root)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(jwalk::Parallelism::RayonNewPool(0))
            .into_iter()
            .filter_map(move |entry_result| {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(e) => {
                        log.warning(format!("Cannot traverse entry: {}", e));
                        return None;
                    }
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let path = entry.path();
                if self.excluded.iter().any(|ex| ex == &path) {
                    return None;
                }
                let relative = match path.strip_prefix(&self.root) {
                    Ok(rel) => path_utils::to_portable(rel),
                    Err(_) => return None,
                };
                if relative.is_empty() {
                    return None;
                }
                Some(WalkedFile { relative, path })
            })
    }
}
