//! Archive manifest model
//!
//! The manifest is embedded as the first member of every archive and is
//! fully deterministic: identical inputs produce byte-identical manifests
//! (and therefore byte-identical archives). Timing information lives in
//! `BuildReport`, which is returned to the caller but never embedded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Current manifest schema version
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Per-file metadata within an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// SHA-256 checksum, `sha256:<hex>`
    pub sha256: String,
    /// Size in bytes
    pub bytes: u64,
}

/// Deterministic archive manifest, embedded as `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Manifest schema version
    pub schema_version: u32,
    /// Number of member files (excluding the manifest itself)
    pub file_count: usize,
    /// Total uncompressed member bytes
    pub total_bytes: u64,
    /// SHA-256 over the sorted `<rel_path>:<digest>` lines
    pub aggregate_checksum: String,
    /// Member files keyed by archive-relative path (sorted by key)
    pub files: BTreeMap<String, FileMeta>,
}

impl ArchiveManifest {
    /// Look up a member by archive-relative path
    pub fn file(&self, rel_path: &str) -> Option<&FileMeta> {
        self.files.get(rel_path)
    }
}

/// Result of a completed archive build. Only the `manifest` part is
/// embedded in the archive.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The embedded manifest
    pub manifest: ArchiveManifest,
    /// Where the archive was published
    pub output_path: PathBuf,
    /// Compressed archive size in bytes
    pub archive_bytes: u64,
    /// Wall-clock build time
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_is_stable() {
        let mut files = BTreeMap::new();
        files.insert(
            "src/lib.rs".to_string(),
            FileMeta {
                sha256: "sha256:abc".into(),
                bytes: 10,
            },
        );
        files.insert(
            "README.md".to_string(),
            FileMeta {
                sha256: "sha256:def".into(),
                bytes: 20,
            },
        );
        let manifest = ArchiveManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            file_count: 2,
            total_bytes: 30,
            aggregate_checksum: "sha256:agg".into(),
            files,
        };

        let a = serde_json::to_vec(&manifest).unwrap();
        let b = serde_json::to_vec(&manifest).unwrap();
        assert_eq!(a, b);

        // BTreeMap keys serialize in sorted order
        let text = String::from_utf8(a).unwrap();
        assert!(text.find("README.md").unwrap() < text.find("src/lib.rs").unwrap());
    }
}
