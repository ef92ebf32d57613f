// Manifest generation engine
// Streams walked files through a bounded hashing pool into a fresh manifest

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::bounded;
use rayon::prelude::*;

use crate::activity_log::ActivityLog;
use crate::cancel::CancelToken;
use crate::error::ArchiveError;
use crate::hasher::HashComputer;
use crate::manifest::{IntegrityRecord, Manifest, ManifestStore};
use crate::probe::{FsProber, Prober};
use crate::progress::{GenerateProgress, ProgressCallback, ProgressNotifier};
use crate::report::GenerateSummary;
use crate::walker::TreeWalker;

/// Capacity of the walker-to-hasher channel; full channel blocks the walker
const DISCOVERY_BUFFER: usize = 1024;

/// Engine for building a fresh manifest over an archive root.
///
/// Producer-consumer pipeline: a walker thread streams discovered files into
/// a bounded channel while a rayon pool hashes them. Per-file failures are
/// logged and counted without aborting the pass; the manifest is written
/// once, atomically, at the end.
pub struct GenerateEngine {
    computer: HashComputer,
    prober: Arc<dyn Prober>,
    store: ManifestStore,
    log: Arc<ActivityLog>,
    cancel: CancelToken,
    progress: ProgressNotifier<GenerateProgress>,
    threads: usize,
    excluded: Vec<PathBuf>,
}

impl GenerateEngine {
    pub fn new(store: ManifestStore, log: Arc<ActivityLog>) -> Self {
        Self {
            computer: HashComputer::new(),
            prober: Arc::new(FsProber),
            store,
            log,
            cancel: CancelToken::new(),
            progress: ProgressNotifier::new(None),
            threads: num_cpus::get(),
            excluded: Vec::new(),
        }
    }

    /// Bound the hashing worker pool
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set a progress callback invoked once per processed file
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(GenerateProgress) + Send + Sync + 'static,
    {
        let boxed: ProgressCallback<GenerateProgress> = Box::new(callback);
        self.progress = ProgressNotifier::new(Some(Arc::new(boxed)));
        self
    }

    /// Exclude an additional artifact file (e.g. the config file) from the walk
    pub fn with_excluded(mut self, path: &Path) -> Self {
        self.excluded.push(path.to_path_buf());
        self
    }

    /// Walk `root`, hash every regular file, and write a fresh manifest.
    ///
    /// Completes with partial success when individual files fail; the
    /// summary reports the failure count. A cancelled run returns the
    /// records built so far and leaves the manifest file untouched.
    pub fn run(&self, root: &Path) -> Result<(Manifest, GenerateSummary), ArchiveError> {
        let start_time = Instant::now();

        let mut walker = TreeWalker::new(root)?
            .exclude(self.store.path())
            .exclude(&self.store.lock_path())
            .exclude(&self.store.staging_path())
            .exclude(self.log.path());
        for path in &self.excluded {
            walker = walker.exclude(path);
        }

        // Single-writer discipline: taken before any work, held to the end
        let lock = self.store.lock()?;

        self.log
            .info(format!("Generating manifest for: {}", walker.root().display()));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| {
                ArchiveError::from_io_error(
                    io::Error::new(io::ErrorKind::Other, e),
                    "starting worker pool",
                    None,
                )
            })?;

        let (sender, receiver) = bounded(DISCOVERY_BUFFER);
        let walker_log = Arc::clone(&self.log);
        let walker_cancel = self.cancel.clone();
        let walker_handle = thread::spawn(move || {
            walker.stream(sender, &walker_cancel, &walker_log);
        });

        let files_processed = AtomicUsize::new(0);
        let files_failed = AtomicUsize::new(0);
        let total_bytes = AtomicU64::new(0);
        let records = Mutex::new(Vec::new());

        pool.install(|| {
            receiver.into_iter().par_bridge().for_each(|file| {
                if self.cancel.is_cancelled() {
                    return;
                }

                let meta = match self.prober.probe(&file.path) {
                    Ok(meta) => meta,
                    Err(e) => {
                        self.log.error(format!("Error probing {}: {}", file.relative, e));
                        files_failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

                let checksum = match self.computer.hash_file(&file.path) {
                    Ok(checksum) => checksum,
                    Err(e) => {
                        self.log.error(format!("Error hashing {}: {}", file.relative, e));
                        files_failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

                let processed = files_processed.fetch_add(1, Ordering::Relaxed) + 1;
                let bytes = total_bytes.fetch_add(meta.size, Ordering::Relaxed) + meta.size;

                self.progress.emit(
                    GenerateProgress {
                        files_processed: processed,
                        files_failed: files_failed.load(Ordering::Relaxed),
                        current_file: file.relative.clone(),
                        bytes_processed: bytes,
                    },
                    &self.log,
                );

                let record = IntegrityRecord {
                    relative_path: file.relative,
                    checksum,
                    size: meta.size,
                    modified: meta.modified,
                    generated_at: Utc::now(),
                };
                records.lock().unwrap_or_else(|p| p.into_inner()).push(record);
            });
        });

        if walker_handle.join().is_err() {
            self.log.warning("Walker thread panicked during generation");
        }

        let mut manifest = Manifest::new();
        for record in records.into_inner().unwrap_or_else(|p| p.into_inner()) {
            manifest.insert(record);
        }

        let summary = GenerateSummary {
            files_processed: files_processed.into_inner(),
            files_failed: files_failed.into_inner(),
            total_bytes: total_bytes.into_inner(),
            duration: start_time.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };

        if summary.cancelled {
            self.log
                .info("Manifest generation cancelled; existing manifest left untouched");
            drop(lock);
            return Ok((manifest, summary));
        }

        self.store.save(&manifest)?;
        drop(lock);

        self.log.info(format!(
            "Manifest generation complete: {} files processed, {} failed",
            summary.files_processed, summary.files_failed
        ));

        Ok((manifest, summary))
    }
}
