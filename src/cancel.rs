// Cooperative cancellation token shared between a caller and the engines

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal.
///
/// Cancelling stops the engines from scheduling new file operations;
/// in-flight hashes run to completion, and no manifest write happens for a
/// cancelled pass. Cancellation is not an error: the resulting summary or
/// report is returned with its cancelled flag set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
