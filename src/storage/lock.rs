//! Exclusive file lock with bounded-timeout acquisition
//!
//! Serializes all mutation of a durable resource (version state file,
//! repository index) across processes. The lock file carries JSON
//! metadata identifying the holder; acquisition retries with backoff up
//! to a bounded timeout and then fails with a retryable `LockTimeout`
//! rather than blocking indefinitely. Released on drop.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::models::errors::{PackdError, Result};

/// Default bounded wait for lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial retry backoff; doubled per attempt up to `MAX_BACKOFF`
const INITIAL_BACKOFF: Duration = Duration::from_millis(25);
const MAX_BACKOFF: Duration = Duration::from_millis(400);

/// Metadata written into the lock file for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Process ID of the holder
    pub pid: u32,
    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
    /// What the holder is doing (e.g. "commit-increment", "store")
    pub operation: String,
}

impl LockMetadata {
    fn new(operation: &str) -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            operation: operation.to_string(),
        }
    }
}

/// A held exclusive lock on a durable resource.
///
/// The underlying file handle keeps the advisory lock alive; dropping
/// the guard releases it and removes the lock file.
pub struct ResourceLock {
    file: File,
    path: PathBuf,
}

impl ResourceLock {
    /// Acquire the lock for `resource` (lock file is `<resource>.lock`),
    /// waiting at most `timeout`.
    pub fn acquire(resource: &Path, operation: &str, timeout: Duration) -> Result<Self> {
        let path = lock_path_for(resource);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut lock = Self { file, path };
                    lock.write_metadata(operation)?;
                    tracing::debug!(
                        resource = %resource.display(),
                        operation,
                        "lock acquired"
                    );
                    return Ok(lock);
                }
                Err(_) if started.elapsed() < timeout => {
                    drop(file);
                    std::thread::sleep(backoff.min(timeout.saturating_sub(started.elapsed())));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(_) => {
                    tracing::warn!(
                        resource = %resource.display(),
                        waited = ?started.elapsed(),
                        "lock acquisition timed out"
                    );
                    return Err(PackdError::LockTimeout {
                        path,
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }

    fn write_metadata(&mut self, operation: &str) -> Result<()> {
        let metadata = LockMetadata::new(operation);
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| PackdError::Io(std::io::Error::other(e)))?;
        self.file.set_len(0)?;
        self.file.write_all(json.as_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Lock file path for a resource
pub fn lock_path_for(resource: &Path) -> PathBuf {
    let mut path = resource.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

/// Read the holder metadata of an existing lock file, if readable
pub fn read_holder(resource: &Path) -> Option<LockMetadata> {
    let content = std::fs::read_to_string(lock_path_for(resource)).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("state.yaml");

        let lock = ResourceLock::acquire(&resource, "test", DEFAULT_LOCK_TIMEOUT).unwrap();
        assert!(lock_path_for(&resource).exists());

        let holder = read_holder(&resource).unwrap();
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(holder.operation, "test");

        drop(lock);
        assert!(!lock_path_for(&resource).exists());
    }

    #[test]
    fn test_reacquire_after_release() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("state.yaml");

        let first = ResourceLock::acquire(&resource, "a", DEFAULT_LOCK_TIMEOUT).unwrap();
        drop(first);
        let second = ResourceLock::acquire(&resource, "b", DEFAULT_LOCK_TIMEOUT).unwrap();
        drop(second);
    }

    #[test]
    fn test_contended_lock_times_out() {
        let temp = TempDir::new().unwrap();
        let resource = temp.path().join("state.yaml");

        let _held = ResourceLock::acquire(&resource, "holder", DEFAULT_LOCK_TIMEOUT).unwrap();

        // Contend from a second thread: fs2 locks are per-file-handle,
        // so another handle in the same process still conflicts.
        let resource2 = resource.clone();
        let result = std::thread::spawn(move || {
            ResourceLock::acquire(&resource2, "contender", Duration::from_millis(150))
        })
        .join()
        .unwrap();

        match result {
            Err(PackdError::LockTimeout { waited, .. }) => {
                assert!(waited >= Duration::from_millis(150));
            }
            other => panic!("expected LockTimeout, got {:?}", other.map(|_| ())),
        }
    }
}
