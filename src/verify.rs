// Verification engine
// Classifies the live tree against a manifest as unchanged/modified/missing/new

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;

use crate::activity_log::ActivityLog;
use crate::cancel::CancelToken;
use crate::error::ArchiveError;
use crate::hasher::HashComputer;
use crate::manifest::{IntegrityRecord, Manifest, ManifestStore};
use crate::policy::{decide, Decision};
use crate::probe::{FsProber, Mtime, Prober};
use crate::progress::{ProgressCallback, ProgressNotifier, VerifyProgress};
use crate::report::{ModifiedDetail, OutcomeKind, VerificationOutcome, VerificationReport};
use crate::walker::TreeWalker;

/// Work item for one manifest entry that still exists on disk
struct CheckTask {
    record: IntegrityRecord,
    path: PathBuf,
}

/// Result of checking one present file
struct Checked {
    outcome: VerificationOutcome,
    /// Metadata to fold back into the record after an equal-digest rehash
    refresh: Option<(u64, Mtime)>,
}

/// Engine for verifying an archive tree against its manifest.
///
/// Per-file state machines run independently across a bounded rayon pool;
/// the only shared state is the append-only log and the report accumulator.
/// A final collation step re-sorts outcomes by relative path, so the report
/// is deterministic regardless of scheduling.
pub struct VerifyEngine {
    computer: HashComputer,
    prober: Arc<dyn Prober>,
    store: ManifestStore,
    log: Arc<ActivityLog>,
    cancel: CancelToken,
    progress: ProgressNotifier<VerifyProgress>,
    threads: usize,
    deep_verify: bool,
    add_new_files: bool,
    excluded: Vec<PathBuf>,
}

impl VerifyEngine {
    pub fn new(store: ManifestStore, log: Arc<ActivityLog>) -> Self {
        Self {
            computer: HashComputer::new(),
            prober: Arc::new(FsProber),
            store,
            log,
            cancel: CancelToken::new(),
            progress: ProgressNotifier::new(None),
            threads: num_cpus::get(),
            deep_verify: false,
            add_new_files: false,
            excluded: Vec::new(),
        }
    }

    /// Force a rehash of every file, bypassing the size+mtime policy
    pub fn with_deep_verify(mut self, deep_verify: bool) -> Self {
        self.deep_verify = deep_verify;
        self
    }

    /// Absorb files found on disk but absent from the manifest
    pub fn with_add_new(mut self, add_new_files: bool) -> Self {
        self.add_new_files = add_new_files;
        self
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

    /// Replace the metadata probe; the seam used by tests that pin metadata
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Set a progress callback invoked once per classified file
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(VerifyProgress) + Send + Sync + 'static,
    {
        let boxed: ProgressCallback<VerifyProgress> = Box::new(callback);
        self.progress = ProgressNotifier::new(Some(Arc::new(boxed)));
        self
    }

    /// Exclude an additional artifact file (e.g. the config file) from the walk
    pub fn with_excluded(mut self, path: &Path) -> Self {
        self.excluded.push(path.to_path_buf());
        self
    }

    /// Verify the tree under `root` against `manifest`.
    ///
    /// The manifest is mutated in memory (metadata refreshes, and new-file
    /// absorption when enabled) but the on-disk file is rewritten at most
    /// once, atomically, after every file has been classified. Without
    /// new-file absorption the on-disk manifest is never touched.
    pub fn run(
        &self,
        root: &Path,
        manifest: &mut Manifest,
    ) -> Result<VerificationReport, ArchiveError> {
        let start_time = Instant::now();

        let mut walker = TreeWalker::new(root)?
            .exclude(self.store.path())
            .exclude(&self.store.lock_path())
            .exclude(&self.store.staging_path())
            .exclude(self.log.path());
        for path in &self.excluded {
            walker = walker.exclude(path);
        }

        // Taken up front so a held lock aborts before any work, not after
        let lock = if self.add_new_files {
            Some(self.store.lock()?)
        } else {
            None
        };

        self.log
            .info(format!("Verifying integrity for: {}", walker.root().display()));

        let current: BTreeMap<String, PathBuf> = walker
            .collect(&self.log)
            .into_iter()
            .map(|file| (file.relative, file.path))
            .collect();

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

        let files_checked = AtomicUsize::new(0);
        let files_failed = AtomicUsize::new(0);
        let files_hashed = AtomicUsize::new(0);
        let mut outcomes = Vec::new();

        // Manifest entries gone from the tree are missing; everything else
        // becomes a per-file check task for the pool
        let mut tasks = Vec::new();
        for (relative_path, record) in manifest.iter() {
            match current.get(relative_path) {
                Some(path) => tasks.push(CheckTask {
                    record: record.clone(),
                    path: path.clone(),
                }),
                None => {
                    self.log.warning(format!("MISSING: {}", relative_path));
                    self.classified(&files_checked, relative_path, OutcomeKind::Missing);
                    outcomes.push(VerificationOutcome {
                        relative_path: relative_path.clone(),
                        kind: OutcomeKind::Missing,
                        detail: None,
                    });
                }
            }
        }

        let checked: Vec<Checked> = pool.install(|| {
            tasks
                .par_iter()
                .filter_map(|task| self.check_file(task, &files_checked, &files_failed, &files_hashed))
                .collect()
        });

        for item in checked {
            if let Some((size, modified)) = item.refresh {
                manifest.refresh_metadata(&item.outcome.relative_path, size, modified);
            }
            outcomes.push(item.outcome);
        }

        // Files on disk with no manifest record
        let new_paths: Vec<(String, PathBuf)> = current
            .into_iter()
            .filter(|(relative, _)| !manifest.contains(relative))
            .collect();
        for (relative, _) in &new_paths {
            self.log.info(format!("NEW: {}", relative));
            self.classified(&files_checked, relative, OutcomeKind::New);
            outcomes.push(VerificationOutcome {
                relative_path: relative.clone(),
                kind: OutcomeKind::New,
                detail: None,
            });
        }

        if self.add_new_files && !new_paths.is_empty() && !self.cancel.is_cancelled() {
            let absorbed: Vec<IntegrityRecord> = pool.install(|| {
                new_paths
                    .par_iter()
                    .filter_map(|(relative, path)| {
                        self.absorb_new(relative, path, &files_failed, &files_hashed)
                    })
                    .collect()
            });
            let count = absorbed.len();
            for record in absorbed {
                manifest.insert(record);
            }
            if !self.cancel.is_cancelled() {
                // The single write-back of the pass
                self.store.save(manifest)?;
                self.log.info(format!("Added {} new files to manifest", count));
            }
        }
        drop(lock);

        outcomes.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let report = VerificationReport {
            unchanged: count_kind(&outcomes, OutcomeKind::Unchanged),
            modified: count_kind(&outcomes, OutcomeKind::Modified),
            missing: count_kind(&outcomes, OutcomeKind::Missing),
            new_files: count_kind(&outcomes, OutcomeKind::New),
            files_failed: files_failed.into_inner(),
            files_hashed: files_hashed.into_inner(),
            duration: start_time.elapsed(),
            cancelled: self.cancel.is_cancelled(),
            outcomes,
        };

        self.log.info(format!(
            "Integrity check complete. OK: {}, Modified: {}, Missing: {}, New: {}",
            report.unchanged, report.modified, report.missing, report.new_files
        ));

        Ok(report)
    }

    /// Run one present file through probe -> policy -> (skip | rehash)
    fn check_file(
        &self,
        task: &CheckTask,
        files_checked: &AtomicUsize,
        files_failed: &AtomicUsize,
        files_hashed: &AtomicUsize,
    ) -> Option<Checked> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let relative = &task.record.relative_path;

        let meta = match self.prober.probe(&task.path) {
            Ok(meta) => meta,
            Err(e) => {
                self.log.error(format!("ERROR processing {}: {}", relative, e));
                files_failed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let decision = if self.deep_verify {
            Decision::MustRehash
        } else {
            decide(&task.record, &meta)
        };

        if decision == Decision::TrustExistingHash {
            self.log.info(format!("OK: {} (unchanged)", relative));
            self.classified(files_checked, relative, OutcomeKind::Unchanged);
            return Some(Checked {
                outcome: VerificationOutcome {
                    relative_path: relative.clone(),
                    kind: OutcomeKind::Unchanged,
                    detail: None,
                },
                refresh: None,
            });
        }

        files_hashed.fetch_add(1, Ordering::Relaxed);
        let checksum = match self.computer.hash_file(&task.path) {
            Ok(checksum) => checksum,
            Err(e) => {
                self.log.error(format!("ERROR processing {}: {}", relative, e));
                files_failed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if checksum == task.record.checksum {
            // Metadata drift without content drift is not a violation; the
            // record's metadata is brought up to date instead
            self.log
                .info(format!("OK: {} (size/mod time changed but hash matches)", relative));
            self.classified(files_checked, relative, OutcomeKind::Unchanged);
            Some(Checked {
                outcome: VerificationOutcome {
                    relative_path: relative.clone(),
                    kind: OutcomeKind::Unchanged,
                    detail: None,
                },
                refresh: Some((meta.size, meta.modified)),
            })
        } else {
            self.log.error(format!("MODIFIED: {}", relative));
            self.classified(files_checked, relative, OutcomeKind::Modified);
            Some(Checked {
                outcome: VerificationOutcome {
                    relative_path: relative.clone(),
                    kind: OutcomeKind::Modified,
                    detail: Some(ModifiedDetail {
                        old_checksum: task.record.checksum.clone(),
                        new_checksum: checksum,
                        old_size: task.record.size,
                        new_size: meta.size,
                        old_modified: task.record.modified,
                        new_modified: meta.modified,
                    }),
                },
                refresh: None,
            })
        }
    }

    /// Hash and probe a new file so it can be merged into the manifest
    fn absorb_new(
        &self,
        relative: &str,
        path: &Path,
        files_failed: &AtomicUsize,
        files_hashed: &AtomicUsize,
    ) -> Option<IntegrityRecord> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let meta = match self.prober.probe(path) {
            Ok(meta) => meta,
            Err(e) => {
                self.log.error(format!("Error probing {}: {}", relative, e));
                files_failed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        files_hashed.fetch_add(1, Ordering::Relaxed);
        let checksum = match self.computer.hash_file(path) {
            Ok(checksum) => checksum,
            Err(e) => {
                self.log.error(format!("Error hashing {}: {}", relative, e));
                files_failed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        Some(IntegrityRecord {
            relative_path: relative.to_string(),
            checksum,
            size: meta.size,
            modified: meta.modified,
            generated_at: Utc::now(),
        })
    }

    fn classified(&self, files_checked: &AtomicUsize, relative: &str, outcome: OutcomeKind) {
        let checked = files_checked.fetch_add(1, Ordering::Relaxed) + 1;
        self.progress.emit(
            VerifyProgress {
                files_checked: checked,
                relative_path: relative.to_string(),
                outcome,
            },
            &self.log,
        );
    }
}

fn count_kind(outcomes: &[VerificationOutcome], kind: OutcomeKind) -> usize {
    outcomes.iter().filter(|o| o.kind == kind).count()
}
