// Progress reporting plumbing shared by the engines

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::activity_log::ActivityLog;
use crate::report::OutcomeKind;

/// Longest a progress callback may block the engine before it is disabled
const CALLBACK_BUDGET: Duration = Duration::from_millis(100);

/// Progress event emitted once per file during manifest generation
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerateProgress {
    pub files_processed: usize,
    pub files_failed: usize,
    pub current_file: String,
    pub bytes_processed: u64,
}

/// Progress event emitted once per classified file during verification
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyProgress {
    pub files_checked: usize,
    pub relative_path: String,
    pub outcome: OutcomeKind,
}

/// Type alias for progress callback functions
pub type ProgressCallback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Wrapper around an optional progress callback.
///
/// Each invocation is timed; a callback that overruns its budget is skipped
/// for the rest of the run with a logged warning, so a slow consumer can
/// never stall the hashing pipeline indefinitely.
pub struct ProgressNotifier<T> {
    callback: Option<Arc<ProgressCallback<T>>>,
    disabled: AtomicBool,
}

impl<T> ProgressNotifier<T> {
    pub fn new(callback: Option<Arc<ProgressCallback<T>>>) -> Self {
        Self {
            callback,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, event: T, log: &ActivityLog) {
        let Some(callback) = self.callback.as_ref() else {
            return;
        };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        let started = Instant::now();
        callback(event);
        if started.elapsed() > CALLBACK_BUDGET {
            self.disabled.store(true, Ordering::Relaxed);
            log.warning("Progress callback exceeded its time budget; further progress events skipped");
        }
    }
}
