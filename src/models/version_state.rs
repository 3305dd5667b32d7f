//! Version state model - the persisted version/stage state machine
//!
//! The state file (VERSION_STATE.yaml) is the sole source of truth for
//! the project's current version and development stage. It is seeded at
//! 0.0.0/dev on first use and mutated only through validated operations
//! in `state::VersionStateManager`.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::models::errors::{PackdError, Result};

/// Current state file schema version
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Maximum retained increment records (oldest pruned first)
pub const DEFAULT_HISTORY_RETENTION: usize = 100;

/// Development stage in the release-maturity progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Alpha,
    Beta,
    Rc,
    Release,
    Stable,
    Hotfix,
}

impl Stage {
    /// Prerelease label identifier for this stage, if it carries one.
    /// Release and stable versions are bare.
    pub fn prerelease_label(&self) -> Option<&'static str> {
        match self {
            Stage::Dev => Some("dev"),
            Stage::Alpha => Some("alpha"),
            Stage::Beta => Some("beta"),
            Stage::Rc => Some("rc"),
            Stage::Hotfix => Some("hotfix"),
            Stage::Release | Stage::Stable => None,
        }
    }

    /// Display name (matches the serialized form)
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Alpha => "alpha",
            Stage::Beta => "beta",
            Stage::Rc => "rc",
            Stage::Release => "release",
            Stage::Stable => "stable",
            Stage::Hotfix => "hotfix",
        }
    }

    /// Parse a stage name as used in CLI arguments and config files
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Stage::Dev),
            "alpha" => Ok(Stage::Alpha),
            "beta" => Ok(Stage::Beta),
            "rc" => Ok(Stage::Rc),
            "release" => Ok(Stage::Release),
            "stable" => Ok(Stage::Stable),
            "hotfix" => Ok(Stage::Hotfix),
            other => Err(PackdError::validation(format!(
                "unknown stage '{}' (expected dev, alpha, beta, rc, release, stable or hotfix)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of version increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncrementKind {
    Major,
    Minor,
    Patch,
    Prerelease,
    StageChange,
}

impl IncrementKind {
    pub fn name(&self) -> &'static str {
        match self {
            IncrementKind::Major => "major",
            IncrementKind::Minor => "minor",
            IncrementKind::Patch => "patch",
            IncrementKind::Prerelease => "prerelease",
            IncrementKind::StageChange => "stage-change",
        }
    }

    /// Parse an increment kind as used in CLI arguments
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(IncrementKind::Major),
            "minor" => Ok(IncrementKind::Minor),
            "patch" => Ok(IncrementKind::Patch),
            "prerelease" | "pre" => Ok(IncrementKind::Prerelease),
            other => Err(PackdError::validation(format!(
                "unknown increment kind '{}' (expected major, minor, patch or prerelease)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IncrementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One committed version increment. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementRecord {
    /// Version before the increment
    pub from_version: Version,
    /// Version after the increment
    pub to_version: Version,
    /// What kind of increment this was
    pub kind: IncrementKind,
    /// When it was committed
    pub at: DateTime<Utc>,
    /// Session that committed it
    pub session_id: uuid::Uuid,
    /// Whether validation passed (always true for committed records;
    /// kept for forward compatibility with imported histories)
    pub validated: bool,
}

/// One stage transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub at: DateTime<Utc>,
}

/// Persisted version state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionState {
    /// State file schema version
    pub schema_version: u32,
    /// Authoritative current version
    pub current_version: Version,
    /// Current development stage
    pub current_stage: Stage,
    /// Append-only increment history, bounded retention
    #[serde(default)]
    pub history: Vec<IncrementRecord>,
    /// Ordered stage transitions
    #[serde(default)]
    pub stage_transitions: Vec<StageTransition>,
}

impl Default for VersionState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            current_version: Version::new(0, 0, 0),
            current_stage: Stage::Dev,
            history: Vec::new(),
            stage_transitions: Vec::new(),
        }
    }
}

impl VersionState {
    /// Check the stage/label invariant: a prerelease label, when present,
    /// must lead with the current stage's identifier.
    pub fn label_matches_stage(&self) -> bool {
        let pre = self.current_version.pre.as_str();
        match self.current_stage.prerelease_label() {
            Some(label) => {
                pre.is_empty() || pre == label || pre.starts_with(&format!("{}.", label))
            }
            None => pre.is_empty(),
        }
    }
}

/// A proposed (not yet committed) increment
#[derive(Debug, Clone, PartialEq)]
pub struct VersionCandidate {
    /// Version the proposal was computed against
    pub base: Version,
    /// Proposed target version
    pub target: Version,
    /// Increment kind that produced it
    pub kind: IncrementKind,
    /// Stage the target belongs to
    pub stage: Stage,
}

impl std::fmt::Display for VersionCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({})", self.base, self.target, self.kind)
    }
}
