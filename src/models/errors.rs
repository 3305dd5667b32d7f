//! Typed error taxonomy for packd core operations
//!
//! Every mutation of a persisted resource validates fully before writing
//! and commits atomically, so none of these errors can leave a resource
//! half-updated. Callers can distinguish retryable conditions
//! (`LockTimeout`) from ones needing operator intervention
//! (`StateCorruption`, `RepositoryWrite`).

use std::path::PathBuf;
use std::time::Duration;

/// Result type for packd core operations
pub type Result<T> = std::result::Result<T, PackdError>;

/// A single file that failed during parallel checksum work
#[derive(Debug, Clone)]
pub struct FileFailure {
    /// Path that failed
    pub path: PathBuf,
    /// What went wrong
    pub reason: String,
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Errors that can occur across the versioning and archival core
#[derive(Debug, thiserror::Error)]
pub enum PackdError {
    /// Bad input or illegal transition; no side effect occurred
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persisted version state is unreadable or malformed.
    /// Requires restore-from-backup or explicit reinitialization.
    #[error("state file {} is corrupt: {reason}", path.display())]
    StateCorruption { path: PathBuf, reason: String },

    /// Repository blob or index could not be written; no index entry
    /// was committed.
    #[error("repository write failed at {}: {reason}", path.display())]
    RepositoryWrite { path: PathBuf, reason: String },

    /// A multi-file version update failed; every target file has been
    /// restored to its pre-call content.
    #[error("consistency update failed at {}: {reason} (all files restored)", file.display())]
    ConsistencyUpdate { file: PathBuf, reason: String },

    /// Archive build exceeded its wall-clock budget; nothing was published
    #[error("build exceeded {budget:?} budget after {completed} of {total} files")]
    BuildTimeout {
        budget: Duration,
        completed: usize,
        total: usize,
    },

    /// One or more files failed during parallel checksum work; the
    /// report is complete (fail-together), nothing was published.
    #[error("{} file(s) failed during archive build", failures.len())]
    PartialIo { failures: Vec<FileFailure> },

    /// Malformed repository search criteria
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Exclusive lock could not be acquired within the bounded timeout.
    /// Retryable: the holder releases on drop.
    #[error("could not lock {} within {waited:?}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid version: {0}")]
    Semver(#[from] semver::Error),
}

impl PackdError {
    /// Whether the caller may retry without operator intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, PackdError::LockTimeout { .. })
    }

    /// Shorthand for a validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        PackdError::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = PackdError::LockTimeout {
            path: PathBuf::from("/tmp/state.lock"),
            waited: Duration::from_secs(5),
        };
        assert!(err.is_retryable());
        assert!(!PackdError::validation("nope").is_retryable());
    }

    #[test]
    fn test_partial_io_display_counts_failures() {
        let err = PackdError::PartialIo {
            failures: vec![
                FileFailure {
                    path: PathBuf::from("a.txt"),
                    reason: "permission denied".into(),
                },
                FileFailure {
                    path: PathBuf::from("b.txt"),
                    reason: "not found".into(),
                },
            ],
        };
        assert!(err.to_string().contains("2 file(s)"));
    }
}
