//! Parallel checksum computation over a bounded worker pool
//!
//! Per-file SHA-256 digests are computed on a fixed-size rayon pool.
//! Individual file errors are collected rather than aborting the batch;
//! the batch fails together after all parallel work completes.
//! Cancellation is cooperative: the flag is checked before each file,
//! in-flight files run to completion.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::archive::collector::FileSpec;
use crate::models::errors::{FileFailure, PackdError, Result};

/// Default worker-pool size
pub const DEFAULT_WORKERS: usize = 4;

/// Digest of one archived file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// `sha256:<hex>`
    pub sha256: String,
    /// Bytes actually read
    pub bytes: u64,
}

/// Serialized, monotonically increasing progress reporting.
///
/// The count and the callback live behind one mutex so concurrent
/// workers can never deliver out-of-order counts.
pub struct Progress {
    inner: Mutex<ProgressInner>,
}

struct ProgressInner {
    done: u64,
    total: u64,
    callback: Box<dyn FnMut(u64, u64) + Send>,
}

impl Progress {
    pub fn new(total: u64, callback: Box<dyn FnMut(u64, u64) + Send>) -> Self {
        Self {
            inner: Mutex::new(ProgressInner {
                done: 0,
                total,
                callback,
            }),
        }
    }

    fn advance(&self) {
        let mut inner = self.inner.lock().expect("progress mutex poisoned");
        inner.done += 1;
        let (done, total) = (inner.done, inner.total);
        (inner.callback)(done, total);
    }
}

/// Streamed SHA-256 of a file, rendered as `sha256:<hex>`
pub fn checksum_file(path: &Path) -> std::io::Result<FileDigest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut bytes: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }
    Ok(FileDigest {
        sha256: format!("sha256:{:x}", hasher.finalize()),
        bytes,
    })
}

/// Fixed-size checksum worker pool
pub struct ChecksumPool {
    workers: usize,
}

impl ChecksumPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Checksum every file, keyed by archive-relative path.
    ///
    /// `deadline` is the build's wall-clock budget: once passed, the
    /// cancel flag is raised and remaining files are skipped. The caller
    /// distinguishes timeout from IO failure via `cancel`.
    pub fn compute(
        &self,
        files: &[FileSpec],
        cancel: &AtomicBool,
        deadline: Option<Instant>,
        progress: Option<&Progress>,
    ) -> Result<BTreeMap<PathBuf, FileDigest>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| PackdError::Io(std::io::Error::other(e)))?;

        let failures: Mutex<Vec<FileFailure>> = Mutex::new(Vec::new());

        let digests: BTreeMap<PathBuf, FileDigest> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|spec| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            cancel.store(true, Ordering::Relaxed);
                            return None;
                        }
                    }

                    match checksum_file(&spec.path) {
                        Ok(digest) => {
                            if let Some(progress) = progress {
                                progress.advance();
                            }
                            Some((spec.rel_path.clone(), digest))
                        }
                        Err(e) => {
                            failures
                                .lock()
                                .expect("failure list mutex poisoned")
                                .push(FileFailure {
                                    path: spec.path.clone(),
                                    reason: e.to_string(),
                                });
                            None
                        }
                    }
                })
                .collect()
        });

        let failures = failures.into_inner().expect("failure list mutex poisoned");
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "checksum batch failed together");
            return Err(PackdError::PartialIo { failures });
        }
        Ok(digests)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn specs(temp: &TempDir, count: usize) -> Vec<FileSpec> {
        (0..count)
            .map(|i| {
                let rel = PathBuf::from(format!("file-{:03}.txt", i));
                let path = temp.path().join(&rel);
                std::fs::write(&path, format!("content {}", i)).unwrap();
                FileSpec {
                    size: std::fs::metadata(&path).unwrap().len(),
                    path,
                    rel_path: rel,
                }
            })
            .collect()
    }

    #[test]
    fn test_checksum_file_known_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();

        let digest = checksum_file(&path).unwrap();
        assert_eq!(
            digest.sha256,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(digest.bytes, 5);
    }

    #[test]
    fn test_parallel_matches_single_threaded() {
        let temp = TempDir::new().unwrap();
        let files = specs(&temp, 150);
        let cancel = AtomicBool::new(false);

        let parallel = ChecksumPool::new(4)
            .compute(&files, &cancel, None, None)
            .unwrap();
        let single = ChecksumPool::new(1)
            .compute(&files, &cancel, None, None)
            .unwrap();

        assert_eq!(parallel.len(), 150);
        assert_eq!(parallel, single);
    }

    #[test]
    fn test_failures_collected_fail_together() {
        let temp = TempDir::new().unwrap();
        let mut files = specs(&temp, 5);
        files.push(FileSpec {
            path: temp.path().join("missing-a"),
            rel_path: PathBuf::from("missing-a"),
            size: 0,
        });
        files.push(FileSpec {
            path: temp.path().join("missing-b"),
            rel_path: PathBuf::from("missing-b"),
            size: 0,
        });

        let cancel = AtomicBool::new(false);
        let err = ChecksumPool::new(4)
            .compute(&files, &cancel, None, None)
            .unwrap_err();

        match err {
            PackdError::PartialIo { failures } => {
                assert_eq!(failures.len(), 2);
            }
            other => panic!("expected PartialIo, got {}", other),
        }
    }

    #[test]
    fn test_progress_is_monotonic() {
        let temp = TempDir::new().unwrap();
        let files = specs(&temp, 40);
        let cancel = AtomicBool::new(false);

        let last_seen = Arc::new(AtomicU64::new(0));
        let seen = last_seen.clone();
        let progress = Progress::new(
            files.len() as u64,
            Box::new(move |done, total| {
                let prev = seen.swap(done, Ordering::SeqCst);
                assert!(done > prev, "progress went backwards: {} -> {}", prev, done);
                assert_eq!(total, 40);
            }),
        );

        ChecksumPool::new(4)
            .compute(&files, &cancel, None, Some(&progress))
            .unwrap();
        assert_eq!(last_seen.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn test_preset_cancel_skips_work() {
        let temp = TempDir::new().unwrap();
        let files = specs(&temp, 10);
        let cancel = AtomicBool::new(true);

        let digests = ChecksumPool::new(2)
            .compute(&files, &cancel, None, None)
            .unwrap();
        assert!(digests.is_empty());
    }

    #[test]
    fn test_expired_deadline_raises_cancel() {
        let temp = TempDir::new().unwrap();
        let files = specs(&temp, 10);
        let cancel = AtomicBool::new(false);

        let deadline = Instant::now() - std::time::Duration::from_millis(1);
        let digests = ChecksumPool::new(2)
            .compute(&files, &cancel, Some(deadline), None)
            .unwrap();
        assert!(digests.is_empty());
        assert!(cancel.load(Ordering::Relaxed));
    }
}
