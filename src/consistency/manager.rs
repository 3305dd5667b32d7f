//! Cross-file version consistency manager
//!
//! Compares every registered project file against the authoritative
//! version and rewrites them in one all-or-nothing transaction: snapshot
//! everything, rewrite + confirm each file, and on any failure restore
//! every snapshot so the tree is byte-identical to its pre-call state.

use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::consistency::syntax::VersionSyntax;
use crate::models::errors::{PackdError, Result};
use crate::storage::atomic::write_atomic;
use crate::storage::transaction::FileTransaction;

/// A project file registered for version synchronization
pub struct ManagedFile {
    /// File path
    pub path: PathBuf,
    /// How the version is embedded in this file
    pub syntax: Box<dyn VersionSyntax>,
    /// Whether a missing version token fails the operation instead of
    /// being skipped with a warning
    pub mandatory: bool,
}

/// One file's observation during a consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Token found with this value
    Version(String),
    /// File exists but carries no version token
    NoToken,
    /// File does not exist
    Missing,
}

/// Result of `detect_inconsistencies`
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    /// Authoritative version the files were compared against
    pub expected: Version,
    /// Per-file observations
    pub observed: BTreeMap<PathBuf, Observation>,
    /// Files whose observed version differs from the authoritative one
    pub mismatches: Vec<PathBuf>,
    /// Non-mandatory files skipped for lack of a token (warned)
    pub skipped: Vec<PathBuf>,
}

impl ConsistencyReport {
    /// Whether every file with a token matches the authoritative version
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Result of a successful `apply_version`
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Files rewritten to the new version
    pub updated: Vec<PathBuf>,
    /// Files already at the target version, left untouched
    pub unchanged: Vec<PathBuf>,
    /// Non-mandatory files skipped for lack of a token
    pub skipped: Vec<PathBuf>,
}

/// Synchronizes the authoritative version across registered project files
#[derive(Default)]
pub struct ConsistencyManager {
    files: Vec<ManagedFile>,
}

impl ConsistencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file with its syntax capability
    pub fn register(
        &mut self,
        path: impl Into<PathBuf>,
        syntax: Box<dyn VersionSyntax>,
        mandatory: bool,
    ) {
        self.files.push(ManagedFile {
            path: path.into(),
            syntax,
            mandatory,
        });
    }

    /// Registered files
    pub fn files(&self) -> &[ManagedFile] {
        &self.files
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// Compare every registered file against `authoritative`.
    ///
    /// Files with conflicting/duplicate tokens fail the whole check with
    /// a `ValidationError`; nothing is mutated either way.
    pub fn detect_inconsistencies(&self, authoritative: &Version) -> Result<ConsistencyReport> {
        let expected = authoritative.to_string();
        let mut observed = BTreeMap::new();
        let mut mismatches = Vec::new();
        let mut skipped = Vec::new();

        for file in &self.files {
            let observation = self.observe(file)?;
            match &observation {
                Observation::Version(v) if *v != expected => {
                    mismatches.push(file.path.clone());
                }
                Observation::Version(_) => {}
                Observation::NoToken | Observation::Missing => {
                    if file.mandatory {
                        return Err(PackdError::validation(format!(
                            "mandatory file {} has no version token ({})",
                            file.path.display(),
                            file.syntax.describe()
                        )));
                    }
                    tracing::warn!(
                        file = %file.path.display(),
                        "no version token found, skipping"
                    );
                    skipped.push(file.path.clone());
                }
            }
            observed.insert(file.path.clone(), observation);
        }

        Ok(ConsistencyReport {
            expected: authoritative.clone(),
            observed,
            mismatches,
            skipped,
        })
    }

    // =========================================================================
    // Transactional apply
    // =========================================================================

    /// Rewrite `targets` (registered paths) to `version`, all or nothing.
    ///
    /// Every target is snapshotted before any is mutated; each rewrite is
    /// confirmed by re-extracting the value from the written file. Any
    /// failure restores every snapshot and fails `ConsistencyUpdate`.
    pub fn apply_version(&self, version: &Version, targets: &[PathBuf]) -> Result<ApplyReport> {
        let files = self.resolve_targets(targets)?;
        let txn = FileTransaction::snapshot(files.iter().map(|f| &f.path))?;

        match self.apply_inner(version, &files) {
            Ok(report) => {
                txn.commit();
                Ok(report)
            }
            Err((file, err)) => {
                if let Err(restore_err) = txn.restore_all() {
                    // Both the rewrite and the restore failed; surface the
                    // restore failure, it is the more urgent one.
                    return Err(PackdError::ConsistencyUpdate {
                        file,
                        reason: format!("{}; restore also failed: {}", err, restore_err),
                    });
                }
                Err(PackdError::ConsistencyUpdate {
                    file,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Apply to every registered file
    pub fn apply_version_all(&self, version: &Version) -> Result<ApplyReport> {
        let targets: Vec<PathBuf> = self.files.iter().map(|f| f.path.clone()).collect();
        self.apply_version(version, &targets)
    }

    fn apply_inner(
        &self,
        version: &Version,
        files: &[&ManagedFile],
    ) -> std::result::Result<ApplyReport, (PathBuf, PackdError)> {
        let expected = version.to_string();
        let mut updated = Vec::new();
        let mut unchanged = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            let fail = |e: PackdError| (file.path.clone(), e);

            if !file.path.exists() {
                if file.mandatory {
                    return Err(fail(PackdError::validation("mandatory file is missing")));
                }
                skipped.push(file.path.clone());
                continue;
            }

            let content = std::fs::read_to_string(&file.path).map_err(|e| fail(e.into()))?;
            match file.syntax.extract(&content).map_err(fail)? {
                None => {
                    if file.mandatory {
                        return Err(fail(PackdError::validation(format!(
                            "mandatory file has no version token ({})",
                            file.syntax.describe()
                        ))));
                    }
                    tracing::warn!(
                        file = %file.path.display(),
                        "no version token found, skipping"
                    );
                    skipped.push(file.path.clone());
                    continue;
                }
                Some(observed) if observed == expected => {
                    unchanged.push(file.path.clone());
                    continue;
                }
                Some(_) => {}
            }

            let rewritten = file.syntax.rewrite(&content, &expected).map_err(fail)?;
            write_atomic(&file.path, rewritten.as_bytes()).map_err(fail)?;

            // Confirm the expected value landed
            let reread = std::fs::read_to_string(&file.path).map_err(|e| fail(e.into()))?;
            let landed = file.syntax.extract(&reread).map_err(fail)?;
            if landed.as_deref() != Some(expected.as_str()) {
                return Err(fail(PackdError::validation(format!(
                    "rewrite verification failed: expected {}, found {:?}",
                    expected, landed
                ))));
            }

            updated.push(file.path.clone());
        }

        Ok(ApplyReport {
            updated,
            unchanged,
            skipped,
        })
    }

    fn resolve_targets(&self, targets: &[PathBuf]) -> Result<Vec<&ManagedFile>> {
        let mut files = Vec::with_capacity(targets.len());
        for target in targets {
            let file = self
                .files
                .iter()
                .find(|f| f.path == *target)
                .ok_or_else(|| {
                    PackdError::validation(format!(
                        "{} is not a registered file",
                        target.display()
                    ))
                })?;
            files.push(file);
        }
        Ok(files)
    }

    fn observe(&self, file: &ManagedFile) -> Result<Observation> {
        if !file.path.exists() {
            return Ok(Observation::Missing);
        }
        let content = std::fs::read_to_string(&file.path)?;
        Ok(match file.syntax.extract(&content)? {
            Some(version) => Observation::Version(version),
            None => Observation::NoToken,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
