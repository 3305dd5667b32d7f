//! Snapshot-all / restore-all file transaction
//!
//! Shared by the consistency manager (multi-file version rewrite) and
//! anything else that must mutate several files with all-or-nothing
//! semantics: snapshot every target before touching any of them, mutate,
//! then either commit (drop the snapshots) or restore every file to its
//! snapshotted content.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::errors::Result;
use crate::storage::atomic::write_atomic;

/// In-memory snapshots of a set of files, keyed by path.
///
/// Files that did not exist at snapshot time are recorded as absent and
/// removed again on restore.
pub struct FileTransaction {
    snapshots: BTreeMap<PathBuf, Option<Vec<u8>>>,
}

impl FileTransaction {
    /// Snapshot the current content of every path. Nothing is mutated.
    pub fn snapshot<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut snapshots = BTreeMap::new();
        for path in paths {
            let path = path.as_ref().to_path_buf();
            let content = if path.exists() {
                Some(fs::read(&path)?)
            } else {
                None
            };
            snapshots.insert(path, content);
        }
        Ok(Self { snapshots })
    }

    /// Paths covered by this transaction
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.snapshots.keys().map(|p| p.as_path())
    }

    /// Restore every snapshotted file to its original content.
    ///
    /// Restoration itself uses atomic replacement per file. Errors are
    /// collected so one failing restore does not abandon the rest; the
    /// first error is returned after all restores were attempted.
    pub fn restore_all(&self) -> Result<()> {
        let mut first_err = None;
        for (path, snapshot) in &self.snapshots {
            let outcome = match snapshot {
                Some(content) => write_atomic(path, content),
                None if path.exists() => fs::remove_file(path).map_err(Into::into),
                None => Ok(()),
            };
            if let Err(e) = outcome {
                tracing::error!(path = %path.display(), error = %e, "snapshot restore failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Commit: the mutation succeeded, snapshots are discarded.
    pub fn commit(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_restore_returns_files_to_snapshot() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, "alpha").unwrap();
        fs::write(&b, "beta").unwrap();

        let txn = FileTransaction::snapshot([&a, &b]).unwrap();
        fs::write(&a, "mutated").unwrap();
        fs::write(&b, "mutated").unwrap();

        txn.restore_all().unwrap();
        assert_eq!(fs::read_to_string(&a).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(&b).unwrap(), "beta");
    }

    #[test]
    fn test_restore_removes_files_created_mid_transaction() {
        let temp = TempDir::new().unwrap();
        let ghost = temp.path().join("ghost.txt");

        let txn = FileTransaction::snapshot([&ghost]).unwrap();
        fs::write(&ghost, "should not survive").unwrap();

        txn.restore_all().unwrap();
        assert!(!ghost.exists());
    }

    #[test]
    fn test_commit_leaves_mutations_in_place() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.txt");
        fs::write(&a, "before").unwrap();

        let txn = FileTransaction::snapshot([&a]).unwrap();
        fs::write(&a, "after").unwrap();
        txn.commit();

        assert_eq!(fs::read_to_string(&a).unwrap(), "after");
    }
}
