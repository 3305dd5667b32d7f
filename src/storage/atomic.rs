//! Atomic file replacement with bounded backup rotation
//!
//! Every durable file in packd (version state, repository index) is
//! written with the same discipline: serialize to a temporary file in
//! the target's directory, flush and fsync it, then rename over the
//! target. A crash at any point leaves either the old or the new
//! content, never a torn file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::errors::Result;

/// Number of prior snapshots kept beside the target by default
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

/// Atomically replace `target` with `content`.
///
/// The temporary file is created in the target's parent directory so the
/// final rename stays on one filesystem.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;

    tracing::debug!(path = %target.display(), bytes = content.len(), "atomic replace");
    Ok(())
}

/// Atomically replace `target` with `content`, first rotating the
/// current content into `backups/` beside it.
///
/// Backups are named `<file>.<n>.bak` with `1` the most recent; at most
/// `retention` are kept, oldest pruned.
pub fn write_atomic_with_backup(target: &Path, content: &[u8], retention: usize) -> Result<()> {
    if target.exists() && retention > 0 {
        rotate_backups(target, retention)?;
    }
    write_atomic(target, content)
}

/// Directory holding backups for `target`
pub fn backup_dir(target: &Path) -> PathBuf {
    target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("backups")
}

/// Path of the most recent backup for `target`, if one exists
pub fn latest_backup(target: &Path) -> Option<PathBuf> {
    let path = backup_path(target, 1);
    path.exists().then_some(path)
}

fn backup_path(target: &Path, n: usize) -> PathBuf {
    let name = target
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    backup_dir(target).join(format!("{}.{}.bak", name, n))
}

/// Shift `.1.bak` -> `.2.bak` -> ... and copy the current target into
/// `.1.bak`, dropping anything past `retention`.
fn rotate_backups(target: &Path, retention: usize) -> Result<()> {
    fs::create_dir_all(backup_dir(target))?;

    let oldest = backup_path(target, retention);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..retention).rev() {
        let from = backup_path(target, n);
        if from.exists() {
            fs::rename(&from, backup_path(target, n + 1))?;
        }
    }
    fs::copy(target, backup_path(target, 1))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.yaml");

        write_atomic(&target, b"one").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"one");

        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }

    #[test]
    fn test_backup_rotation_keeps_bounded_history() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.yaml");

        write_atomic_with_backup(&target, b"v1", 3).unwrap();
        write_atomic_with_backup(&target, b"v2", 3).unwrap();
        write_atomic_with_backup(&target, b"v3", 3).unwrap();
        write_atomic_with_backup(&target, b"v4", 3).unwrap();
        write_atomic_with_backup(&target, b"v5", 3).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"v5");
        // Most recent backup holds the previous content
        let latest = latest_backup(&target).unwrap();
        assert_eq!(fs::read(latest).unwrap(), b"v4");

        // Only `retention` backups survive
        let count = fs::read_dir(backup_dir(&target)).unwrap().count();
        assert_eq!(count, 3);
        // Oldest retained is v2 (v1 was pruned)
        assert_eq!(
            fs::read(backup_dir(&target).join("state.yaml.3.bak")).unwrap(),
            b"v2"
        );
    }

    #[test]
    fn test_no_backup_on_first_write() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.yaml");
        write_atomic_with_backup(&target, b"first", 3).unwrap();
        assert!(latest_backup(&target).is_none());
    }
}
