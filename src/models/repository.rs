//! Repository entry and search criteria models

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::errors::{PackdError, Result};

/// Metadata supplied by the caller when storing an artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Package name
    pub name: String,
    /// Package version
    pub version: Option<Version>,
    /// Target platform (e.g. `linux-x86_64`)
    pub platform: Option<String>,
    /// Free-form key/value metadata
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// One stored artifact. Identity is the content checksum; entries are
/// immutable and removed only through explicit maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Entry identity: `sha256:<hex>` of the artifact content
    pub id: String,
    /// Package name
    pub name: String,
    /// Package version, if known
    pub version: Option<Version>,
    /// Target platform, if known
    pub platform: Option<String>,
    /// Content checksum (equals `id`)
    pub checksum: String,
    /// Blob path relative to the repository root
    pub path: PathBuf,
    /// Artifact size in bytes
    pub size_bytes: u64,
    /// When the entry was stored
    pub created_at: DateTime<Utc>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Search criteria for `PackageRepository::find`
///
/// All present fields must match. At least one field must be set.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Substring match on the package name
    pub name: Option<String>,
    /// Exact version or a semver requirement (`1.2.3`, `^1.2`, `>=2`)
    pub version: Option<String>,
    /// Exact platform match
    pub platform: Option<String>,
    /// Entries created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Entries created at or before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    /// Validate the criteria, returning the parsed version requirement
    /// (if any). Malformed criteria fail with `InvalidQuery`.
    pub fn validate(&self) -> Result<Option<VersionReq>> {
        if self.name.is_none()
            && self.version.is_none()
            && self.platform.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
        {
            return Err(PackdError::InvalidQuery(
                "at least one search field is required".into(),
            ));
        }

        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(PackdError::InvalidQuery(format!(
                    "date range is inverted: {} > {}",
                    after, before
                )));
            }
        }

        match &self.version {
            None => Ok(None),
            Some(spec) => {
                // Accept both a plain version and a requirement expression
                let req = if let Ok(exact) = Version::parse(spec) {
                    VersionReq::parse(&format!("={}", exact))
                } else {
                    VersionReq::parse(spec)
                };
                req.map(Some).map_err(|e| {
                    PackdError::InvalidQuery(format!("bad version spec '{}': {}", spec, e))
                })
            }
        }
    }

    /// Whether an entry matches. `version_req` must come from `validate()`.
    pub fn matches(&self, entry: &RepositoryEntry, version_req: Option<&VersionReq>) -> bool {
        if let Some(name) = &self.name {
            if !entry.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(req) = version_req {
            match &entry.version {
                Some(v) => {
                    if !req.matches(v) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(platform) = &self.platform {
            if entry.platform.as_deref() != Some(platform.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if entry.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at > before {
                return false;
            }
        }
        true
    }
}
