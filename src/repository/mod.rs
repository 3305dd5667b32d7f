//! Checksum-indexed local package repository
//!
//! Artifacts are content-addressed: an entry's identity is the SHA-256
//! of its bytes, so storing identical content twice is an idempotent
//! no-op. One authoritative `index.json` maps entry id to metadata and
//! is only ever mutated under an exclusive lock with atomic replacement;
//! a failed store commits no index entry.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::archive::checksum::checksum_file;
use crate::models::errors::{PackdError, Result};
use crate::models::repository::{EntryMetadata, RepositoryEntry, SearchCriteria};
use crate::storage::atomic::write_atomic;
use crate::storage::lock::{ResourceLock, DEFAULT_LOCK_TIMEOUT};

/// Authoritative metadata index file
pub const INDEX_FILE: &str = "index.json";

/// Content-addressed blob directory
pub const BLOBS_DIR: &str = "blobs";

type Index = BTreeMap<String, RepositoryEntry>;

/// One integrity problem found by `validate_integrity`
#[derive(Debug, Clone)]
pub enum IntegrityIssue {
    /// Indexed blob is gone from disk
    MissingBlob { id: String, path: PathBuf },
    /// Blob content no longer matches its recorded checksum
    ChecksumMismatch {
        id: String,
        expected: String,
        observed: String,
    },
}

/// Result of an integrity sweep
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// Entries examined
    pub checked: usize,
    /// Problems found, in index order
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Content-addressed local store of built artifacts
pub struct PackageRepository {
    root: PathBuf,
    lock_timeout: Duration,
}

impl PackageRepository {
    /// Open (creating directories as needed) the repository at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(BLOBS_DIR))?;
        Ok(Self {
            root,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Repository root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Store an artifact, content-addressed by checksum.
    ///
    /// Identical content is an idempotent no-op returning the existing
    /// entry. The blob lands via temp-copy + atomic rename before the
    /// index entry commits; any failure leaves the index unchanged.
    pub fn store(&self, artifact: &Path, metadata: EntryMetadata) -> Result<RepositoryEntry> {
        let digest = checksum_file(artifact).map_err(|e| PackdError::RepositoryWrite {
            path: artifact.to_path_buf(),
            reason: format!("cannot checksum artifact: {}", e),
        })?;
        let id = digest.sha256.clone();

        let _lock = ResourceLock::acquire(&self.index_path(), "store", self.lock_timeout)?;
        let mut index = self.read_index()?;

        if let Some(existing) = index.get(&id) {
            tracing::debug!(id = %id, "store is a no-op, content already present");
            return Ok(existing.clone());
        }

        let blob_rel = PathBuf::from(BLOBS_DIR).join(blob_name(&id, artifact));
        let blob_path = self.root.join(&blob_rel);
        self.copy_blob(artifact, &blob_path)?;

        let entry = RepositoryEntry {
            id: id.clone(),
            name: metadata.name,
            version: metadata.version,
            platform: metadata.platform,
            checksum: id.clone(),
            path: blob_rel,
            size_bytes: digest.bytes,
            created_at: Utc::now(),
            metadata: metadata.extra,
        };

        index.insert(id.clone(), entry.clone());
        if let Err(e) = self.write_index(&index) {
            // Roll the blob back so a failed store leaves no trace
            let _ = std::fs::remove_file(&blob_path);
            return Err(e);
        }

        tracing::info!(id = %id, blob = %blob_path.display(), "artifact stored");
        Ok(entry)
    }

    fn copy_blob(&self, artifact: &Path, blob_path: &Path) -> Result<()> {
        let blobs_dir = self.root.join(BLOBS_DIR);
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&blobs_dir)?;
            let mut tmp = NamedTempFile::new_in(&blobs_dir)?;
            let mut src = std::fs::File::open(artifact)?;
            std::io::copy(&mut src, &mut tmp)?;
            tmp.as_file().sync_all()?;
            tmp.persist(blob_path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| PackdError::RepositoryWrite {
            path: blob_path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Entries matching `criteria`, in index (id) order
    pub fn find(&self, criteria: &SearchCriteria) -> Result<Vec<RepositoryEntry>> {
        let version_req = criteria.validate()?;
        let index = self.read_index()?;
        Ok(index
            .into_values()
            .filter(|entry| criteria.matches(entry, version_req.as_ref()))
            .collect())
    }

    /// Every stored entry, in index (id) order
    pub fn list_all(&self) -> Result<Vec<RepositoryEntry>> {
        Ok(self.read_index()?.into_values().collect())
    }

    /// Look up one entry by id
    pub fn get(&self, entry_id: &str) -> Result<Option<RepositoryEntry>> {
        Ok(self.read_index()?.remove(entry_id))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove an entry and its blob. Explicit maintenance only.
    pub fn remove(&self, entry_id: &str) -> Result<RepositoryEntry> {
        let _lock = ResourceLock::acquire(&self.index_path(), "remove", self.lock_timeout)?;
        let mut index = self.read_index()?;

        let entry = index.remove(entry_id).ok_or_else(|| {
            PackdError::validation(format!("no repository entry with id {}", entry_id))
        })?;
        self.write_index(&index)?;

        // Index commit is the authority; a lingering blob is only
        // reported, the next integrity sweep will not flag it.
        let blob_path = self.root.join(&entry.path);
        if let Err(e) = std::fs::remove_file(&blob_path) {
            tracing::warn!(blob = %blob_path.display(), error = %e, "blob removal failed");
        }

        Ok(entry)
    }

    /// Recompute every blob's checksum and report drift between the
    /// index and the blob store.
    pub fn validate_integrity(&self) -> Result<IntegrityReport> {
        let index = self.read_index()?;
        let mut report = IntegrityReport::default();

        for (id, entry) in &index {
            report.checked += 1;
            let blob_path = self.root.join(&entry.path);
            if !blob_path.exists() {
                report.issues.push(IntegrityIssue::MissingBlob {
                    id: id.clone(),
                    path: blob_path,
                });
                continue;
            }
            let digest = checksum_file(&blob_path)?;
            if digest.sha256 != entry.checksum {
                report.issues.push(IntegrityIssue::ChecksumMismatch {
                    id: id.clone(),
                    expected: entry.checksum.clone(),
                    observed: digest.sha256,
                });
            }
        }

        if !report.is_clean() {
            tracing::warn!(issues = report.issues.len(), "repository integrity drift");
        }
        Ok(report)
    }

    // =========================================================================
    // Index IO
    // =========================================================================

    fn read_index(&self) -> Result<Index> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::new());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| PackdError::RepositoryWrite {
            path,
            reason: format!("index is unreadable: {}", e),
        })
    }

    fn write_index(&self, index: &Index) -> Result<()> {
        let path = self.index_path();
        let json =
            serde_json::to_vec_pretty(index).map_err(|e| PackdError::RepositoryWrite {
                path: path.clone(),
                reason: format!("index serialize failed: {}", e),
            })?;
        write_atomic(&path, &json)
    }
}

/// Blob file name for an entry id: the bare hex digest, keeping the
/// artifact's extension for convenience.
fn blob_name(id: &str, artifact: &Path) -> String {
    let hex = id.strip_prefix("sha256:").unwrap_or(id);
    match artifact.extension().and_then(|e| e.to_str()) {
        Some("gz") if artifact.to_string_lossy().ends_with(".tar.gz") => {
            format!("{}.tar.gz", hex)
        }
        Some(ext) => format!("{}.{}", hex, ext),
        None => hex.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
