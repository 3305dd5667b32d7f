//! File collection with glob include/exclude filtering
//!
//! Walks a source root and yields file descriptors with archive-relative
//! paths. Patterns are matched against the relative path (forward
//! slashes); a file matching any exclusion is omitted unless a more
//! specific inclusion overrides it.

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::errors::{PackdError, Result};

/// One file selected for archiving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    /// Archive-relative path, the member name and sort key
    pub rel_path: PathBuf,
    /// Size in bytes at collection time
    pub size: u64,
}

/// Compiled include/exclude patterns.
///
/// An empty include list means "everything". Exclusion wins unless an
/// include pattern that also matches is more specific (has more literal,
/// non-wildcard characters) than every matching exclude.
#[derive(Debug)]
pub struct CollectionFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl CollectionFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Whether a relative path should be archived
    pub fn accepts(&self, rel_path: &str) -> bool {
        let excluded = self
            .exclude
            .iter()
            .filter(|p| p.matches(rel_path))
            .map(|p| specificity(p))
            .max();

        match excluded {
            None => {
                self.include.is_empty() || self.include.iter().any(|p| p.matches(rel_path))
            }
            Some(exclude_specificity) => self
                .include
                .iter()
                .filter(|p| p.matches(rel_path))
                .any(|p| specificity(p) > exclude_specificity),
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| PackdError::validation(format!("bad glob pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Literal (non-wildcard) character count, the specificity measure for
/// include-over-exclude overrides
fn specificity(pattern: &Pattern) -> usize {
    pattern
        .as_str()
        .chars()
        .filter(|c| !matches!(c, '*' | '?' | '[' | ']'))
        .count()
}

/// Lazily walk `root` and yield accepted files in directory order.
///
/// Unreadable entries surface as errors; the caller decides whether to
/// collect or abort.
pub fn collect_files<'a>(
    root: &'a Path,
    filter: &'a CollectionFilter,
) -> impl Iterator<Item = Result<FileSpec>> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => return Some(Err(PackdError::Io(std::io::Error::other(e)))),
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let rel_path = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir yields paths under root")
                .to_path_buf();
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            if !filter.accepts(&rel_str) {
                return None;
            }
            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => return Some(Err(PackdError::Io(std::io::Error::other(e)))),
            };
            Some(Ok(FileSpec {
                path: entry.path().to_path_buf(),
                rel_path,
                size,
            }))
        })
}

// =============================================================================
// Tests
// =============================================================================
