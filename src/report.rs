// Verification report types

use std::time::Duration;

use crate::probe::Mtime;

/// Classification of one file after a verify pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OutcomeKind {
    Unchanged,
    Modified,
    Missing,
    New,
}

impl OutcomeKind {
    pub fn label(self) -> &'static str {
        match self {
            OutcomeKind::Unchanged => "OK",
            OutcomeKind::Modified => "MODIFIED",
            OutcomeKind::Missing => "MISSING",
            OutcomeKind::New => "NEW",
        }
    }
}

/// Old and new values carried by a `Modified` outcome for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModifiedDetail {
    pub old_checksum: String,
    pub new_checksum: String,
    pub old_size: u64,
    pub new_size: u64,
    pub old_modified: Mtime,
    pub new_modified: Mtime,
}

/// Per-file result of a verify pass
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VerificationOutcome {
    pub relative_path: String,
    pub kind: OutcomeKind,
    /// Present only for `Modified`
    pub detail: Option<ModifiedDetail>,
}

/// Aggregate result of one verify pass.
///
/// Outcomes are ordered by relative path regardless of how hashing was
/// scheduled, so two runs over the same tree produce identical reports.
/// Constructed fresh per invocation and handed to the caller; never
/// persisted by the engine itself.
#[derive(Debug, serde::Serialize)]
pub struct VerificationReport {
    pub outcomes: Vec<VerificationOutcome>,
    pub unchanged: usize,
    pub modified: usize,
    pub missing: usize,
    pub new_files: usize,
    /// Files that could not be probed or hashed (per-file I/O failures)
    pub files_failed: usize,
    /// Number of hash computations performed; unchanged files that were
    /// trusted by the decision policy do not count
    pub files_hashed: usize,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    /// True when the pass was cut short by cancellation; counts then cover
    /// only the files classified before the abort
    pub cancelled: bool,
}

impl VerificationReport {
    /// A clean pass: nothing modified, nothing missing, not cancelled
    pub fn is_clean(&self) -> bool {
        self.modified == 0 && self.missing == 0 && !self.cancelled
    }
}

/// Statistics returned by a generate pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct GenerateSummary {
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_bytes: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub cancelled: bool,
}

// Helper to serialize Duration as seconds
fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
