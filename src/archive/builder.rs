//! Deterministic archive builder
//!
//! Collects files, checksums them on the worker pool, then serializes a
//! gzip'd tar on exactly one writer: `manifest.json` first, members in
//! archive-relative-path sorted order, every header pinned (mtime 0,
//! uid/gid 0, mode 0o644) and the gzip stream stripped of timestamps.
//! Identical inputs therefore produce byte-identical archives. Output is
//! written to a temporary path and atomically published only after the
//! archive is complete.

use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tar::{Builder as TarBuilder, Header};
use tempfile::NamedTempFile;

use crate::archive::checksum::{ChecksumPool, FileDigest, Progress, DEFAULT_WORKERS};
use crate::archive::collector::{collect_files, CollectionFilter, FileSpec};
use crate::models::errors::{PackdError, Result};
use crate::models::manifest::{ArchiveManifest, BuildReport, FileMeta, MANIFEST_SCHEMA_VERSION};

/// Archive member name of the embedded manifest
pub const MANIFEST_MEMBER: &str = "manifest.json";

/// Fixed compression level; part of the determinism contract
const COMPRESSION_LEVEL: u32 = 6;

/// Configures and runs archive builds for one source root
pub struct ArchiveBuilder {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    workers: usize,
    timeout: Option<Duration>,
}

impl ArchiveBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            workers: DEFAULT_WORKERS,
            timeout: None,
        }
    }

    /// Inclusion override patterns (empty = everything)
    pub fn include(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.include.extend(patterns);
        self
    }

    /// Exclusion patterns, matched against archive-relative paths
    pub fn exclude(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(patterns);
        self
    }

    /// Worker-pool size for checksum computation
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Overall wall-clock budget; exceeding it publishes nothing
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Collect the files the current configuration would archive
    pub fn collect(&self) -> Result<Vec<FileSpec>> {
        let filter = CollectionFilter::new(&self.include, &self.exclude)?;
        let mut files = collect_files(&self.root, &filter).collect::<Result<Vec<_>>>()?;
        // Sort by the member-name string so member order and manifest key
        // order agree exactly
        files.sort_by_key(|f| f.rel_path.to_string_lossy().replace('\\', "/"));
        Ok(files)
    }

    /// Build the archive at `output`.
    ///
    /// `progress` receives `(done, total)` checksum counts, serialized
    /// and monotonically increasing.
    pub fn build(
        &self,
        output: &Path,
        progress: Option<Box<dyn FnMut(u64, u64) + Send>>,
    ) -> Result<BuildReport> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);

        let files = self.collect()?;
        tracing::info!(
            root = %self.root.display(),
            files = files.len(),
            workers = self.workers,
            "archive build started"
        );

        // Parallel phase: checksums on the worker pool
        let cancel = AtomicBool::new(false);
        let progress = progress.map(|cb| Progress::new(files.len() as u64, cb));
        let digests =
            ChecksumPool::new(self.workers).compute(&files, &cancel, deadline, progress.as_ref())?;

        if cancel.load(Ordering::Relaxed) {
            return Err(PackdError::BuildTimeout {
                budget: self.timeout.expect("cancel implies a deadline"),
                completed: digests.len(),
                total: files.len(),
            });
        }

        let manifest = build_manifest(&digests);

        // Single-writer phase: serialize in sorted order to a temp path
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp = NamedTempFile::new_in(parent)?;
        write_archive(tmp.as_file(), &manifest, &files, deadline, self.timeout)?;
        tmp.as_file().sync_all()?;

        // Validate before publishing
        let archive_bytes = tmp.as_file().metadata()?.len();
        if manifest.file_count != files.len() {
            return Err(PackdError::validation(format!(
                "manifest covers {} files but {} were collected",
                manifest.file_count,
                files.len()
            )));
        }

        tmp.persist(output).map_err(|e| e.error)?;
        let elapsed = started.elapsed();
        tracing::info!(
            output = %output.display(),
            bytes = archive_bytes,
            ?elapsed,
            "archive published"
        );

        Ok(BuildReport {
            manifest,
            output_path: output.to_path_buf(),
            archive_bytes,
            elapsed,
        })
    }
}

fn build_manifest(digests: &BTreeMap<PathBuf, FileDigest>) -> ArchiveManifest {
    let mut files = BTreeMap::new();
    let mut total_bytes = 0u64;
    let mut aggregate = Sha256::new();

    // BTreeMap iteration is already rel-path sorted
    for (rel_path, digest) in digests {
        let rel = rel_path.to_string_lossy().replace('\\', "/");
        aggregate.update(format!("{}:{}\n", rel, digest.sha256).as_bytes());
        total_bytes += digest.bytes;
        files.insert(
            rel,
            FileMeta {
                sha256: digest.sha256.clone(),
                bytes: digest.bytes,
            },
        );
    }

    ArchiveManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        file_count: files.len(),
        total_bytes,
        aggregate_checksum: format!("sha256:{:x}", aggregate.finalize()),
        files,
    }
}

/// Serialize the archive: manifest first, then members in sorted order.
/// Exactly one writer; workers are done by the time this runs.
fn write_archive(
    out: &std::fs::File,
    manifest: &ArchiveManifest,
    files: &[FileSpec],
    deadline: Option<Instant>,
    budget: Option<Duration>,
) -> Result<()> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(out, Compression::new(COMPRESSION_LEVEL));
    let mut tar = TarBuilder::new(encoder);
    tar.mode(tar::HeaderMode::Deterministic);

    let manifest_bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| PackdError::Io(std::io::Error::other(e)))?;
    append_member(&mut tar, MANIFEST_MEMBER, manifest_bytes.len() as u64, &manifest_bytes[..])?;

    for spec in files {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                // Temp file is dropped, nothing published
                return Err(PackdError::BuildTimeout {
                    budget: budget.unwrap_or_default(),
                    completed: 0,
                    total: files.len(),
                });
            }
        }
        let rel = spec.rel_path.to_string_lossy().replace('\\', "/");
        let file = std::fs::File::open(&spec.path)?;
        let size = file.metadata()?.len();
        append_member(&mut tar, &rel, size, file)?;
    }

    let encoder = tar.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn append_member<W: std::io::Write, R: std::io::Read>(
    tar: &mut TarBuilder<W>,
    path: &str,
    size: u64,
    data: R,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    tar.append_data(&mut header, path, data)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
