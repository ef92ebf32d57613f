// Incremental re-hash decision policy

use crate::manifest::IntegrityRecord;
use crate::probe::FileMeta;

/// Whether a recorded checksum may be trusted without re-reading content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TrustExistingHash,
    MustRehash,
}

/// Decide whether a file must be re-hashed.
///
/// The existing hash is trusted if and only if the current size and mtime
/// both equal the recorded values exactly, at full stored precision. There
/// is no tolerance window: any difference forces a rehash.
///
/// Known limitation, inherited from size+mtime being a proxy for content: a
/// writer that changes bytes while preserving both size and mtime goes
/// undetected. Deep verification bypasses this policy and rehashes
/// everything.
pub fn decide(record: &IntegrityRecord, current: &FileMeta) -> Decision {
    if current.size == record.size && current.modified == record.modified {
        Decision::TrustExistingHash
    } else {
        Decision::MustRehash
    }
}
