//! VersionStateManager - durable version/stage state machine
//!
//! Owns VERSION_STATE.yaml for a project. All reads go through the
//! in-memory copy; every mutation re-reads the file under an exclusive
//! lock, validates, then persists with atomic replacement and backup
//! rotation. A crash mid-write never corrupts the state file.

use chrono::Utc;
use semver::{Prerelease, Version};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::models::errors::{PackdError, Result};
use crate::models::{
    IncrementKind, IncrementRecord, Stage, StageTransition, VersionCandidate, VersionState,
    DEFAULT_HISTORY_RETENTION,
};
use crate::state::stage_graph::StageGraph;
use crate::storage::atomic::{latest_backup, write_atomic_with_backup, DEFAULT_BACKUP_RETENTION};
use crate::storage::lock::{ResourceLock, DEFAULT_LOCK_TIMEOUT};

/// State file name inside the project's packd directory
pub const STATE_FILE: &str = "VERSION_STATE.yaml";

/// Tunables for a state manager
#[derive(Debug, Clone)]
pub struct StateOptions {
    /// Allowed stage-transition graph
    pub graph: StageGraph,
    /// Maximum retained increment records
    pub history_retention: usize,
    /// Prior state snapshots kept for manual recovery
    pub backup_retention: usize,
    /// Bounded wait for the exclusive state lock
    pub lock_timeout: Duration,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            graph: StageGraph::default(),
            history_retention: DEFAULT_HISTORY_RETENTION,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Authoritative version + development-stage state machine
#[derive(Debug)]
pub struct VersionStateManager {
    state_path: PathBuf,
    state: VersionState,
    options: StateOptions,
    session_id: Uuid,
}

impl VersionStateManager {
    /// Load or seed state for a project directory.
    ///
    /// Missing state seeds 0.0.0/dev in memory; nothing is written until
    /// the first mutation.
    pub fn load(state_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::load_with(state_dir, StateOptions::default())
    }

    /// Load with explicit options
    pub fn load_with(state_dir: impl Into<PathBuf>, options: StateOptions) -> Result<Self> {
        let state_path = state_dir.into().join(STATE_FILE);
        let state = read_state(&state_path)?;
        Ok(Self {
            state_path,
            state,
            options,
            session_id: Uuid::new_v4(),
        })
    }

    /// Current state (read-only)
    pub fn current_state(&self) -> &VersionState {
        &self.state
    }

    /// Session identifier stamped onto committed increments
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Path of the persisted state file
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    // =========================================================================
    // Increment proposal & commit
    // =========================================================================

    /// Compute a candidate for `kind` against the current state. No side
    /// effect; the candidate is validated again at commit time.
    ///
    /// `explicit` overrides the computed target but is still validated
    /// for monotonicity and stage/label fit.
    pub fn propose_increment(
        &self,
        kind: IncrementKind,
        explicit: Option<Version>,
    ) -> Result<VersionCandidate> {
        propose(&self.state, kind, explicit)
    }

    /// Validate and durably commit a proposed increment.
    ///
    /// The state file is re-read under the lock so a candidate computed
    /// against a version another process has since moved past is
    /// rejected rather than silently rewinding.
    pub fn commit_increment(&mut self, candidate: &VersionCandidate) -> Result<IncrementRecord> {
        let _lock = self.lock("commit-increment")?;
        let mut state = read_state(&self.state_path)?;

        if state.current_version != candidate.base {
            return Err(PackdError::validation(format!(
                "stale candidate: proposed against {} but current version is {}",
                candidate.base, state.current_version
            )));
        }
        if candidate.target <= state.current_version {
            return Err(PackdError::validation(format!(
                "target {} does not advance past {}",
                candidate.target, state.current_version
            )));
        }

        let record = IncrementRecord {
            from_version: state.current_version.clone(),
            to_version: candidate.target.clone(),
            kind: candidate.kind,
            at: Utc::now(),
            session_id: self.session_id,
            validated: true,
        };

        state.current_version = candidate.target.clone();
        state.history.push(record.clone());
        prune_history(&mut state, self.options.history_retention);

        self.persist(&state)?;
        self.state = state;
        Ok(record)
    }

    // =========================================================================
    // Stage transitions
    // =========================================================================

    /// Transition to `target`, validated against the stage graph.
    ///
    /// When the current version carries a prerelease label the label is
    /// rewritten to match the target stage (stripped for release/stable,
    /// re-seeded at `<stage>.1` otherwise); a bare version is left
    /// untouched and gains its label on the next prerelease increment.
    pub fn transition_stage(&mut self, target: Stage) -> Result<StageTransition> {
        let _lock = self.lock("transition-stage")?;
        let mut state = read_state(&self.state_path)?;

        self.options.graph.check(state.current_stage, target)?;

        let transition = StageTransition {
            from: state.current_stage,
            to: target,
            at: Utc::now(),
        };

        let relabeled = relabel_for_stage(&state.current_version, target)?;
        if relabeled != state.current_version {
            let record = IncrementRecord {
                from_version: state.current_version.clone(),
                to_version: relabeled.clone(),
                kind: IncrementKind::StageChange,
                at: transition.at,
                session_id: self.session_id,
                validated: true,
            };
            state.history.push(record);
            prune_history(&mut state, self.options.history_retention);
            state.current_version = relabeled;
        }

        state.current_stage = target;
        state.stage_transitions.push(transition);

        self.persist(&state)?;
        self.state = state;
        Ok(transition)
    }

    // =========================================================================
    // History & suggestions
    // =========================================================================

    /// The most recent `limit` increment records, oldest first
    pub fn history(&self, limit: usize) -> &[IncrementRecord] {
        let len = self.state.history.len();
        &self.state.history[len.saturating_sub(limit)..]
    }

    /// Ordered candidates: increments compatible with the current stage
    /// first, then what each allowed stage transition would produce.
    pub fn suggest_next_versions(
        &self,
        kind: Option<IncrementKind>,
    ) -> Result<Vec<VersionCandidate>> {
        let mut candidates = Vec::new();

        let kinds = [
            IncrementKind::Patch,
            IncrementKind::Minor,
            IncrementKind::Major,
            IncrementKind::Prerelease,
        ];
        for k in kinds {
            if let Some(filter) = kind {
                if k != filter {
                    continue;
                }
            }
            if let Ok(candidate) = propose(&self.state, k, None) {
                candidates.push(candidate);
            }
        }

        if kind.is_none() {
            for &target in self.options.graph.targets(self.state.current_stage) {
                let relabeled = relabel_for_stage(&self.state.current_version, target)?;
                candidates.push(VersionCandidate {
                    base: self.state.current_version.clone(),
                    target: relabeled,
                    kind: IncrementKind::StageChange,
                    stage: target,
                });
            }
        }

        Ok(candidates)
    }

    // =========================================================================
    // Operator recovery
    // =========================================================================

    /// Replace a corrupt state file with its most recent snapshot and
    /// reload. Explicit operator action; fails if no backup exists.
    pub fn restore_latest_backup(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_dir.into().join(STATE_FILE);
        {
            let _lock =
                ResourceLock::acquire(&state_path, "restore-backup", DEFAULT_LOCK_TIMEOUT)?;

            let backup = latest_backup(&state_path).ok_or_else(|| PackdError::StateCorruption {
                path: state_path.clone(),
                reason: "no backup snapshot available to restore".into(),
            })?;
            let content = std::fs::read(&backup)?;

            // Refuse to restore a snapshot that is itself unreadable
            serde_yaml::from_slice::<VersionState>(&content).map_err(|e| {
                PackdError::StateCorruption {
                    path: backup.clone(),
                    reason: format!("backup is unreadable: {}", e),
                }
            })?;

            crate::storage::atomic::write_atomic(&state_path, &content)?;
            tracing::info!(
                state = %state_path.display(),
                backup = %backup.display(),
                "state restored from backup"
            );
        }
        let dir = state_path.parent().expect("state path has a parent");
        Self::load(dir)
    }

    /// Discard the persisted state and re-seed 0.0.0/dev. The previous
    /// file (even if corrupt) is rotated into backups first.
    pub fn reinitialize(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_dir.into().join(STATE_FILE);
        {
            let _lock = ResourceLock::acquire(&state_path, "reinitialize", DEFAULT_LOCK_TIMEOUT)?;
            let fresh = VersionState::default();
            let yaml = serde_yaml::to_string(&fresh).map_err(|e| PackdError::StateCorruption {
                path: state_path.clone(),
                reason: format!("serialize failed: {}", e),
            })?;
            write_atomic_with_backup(&state_path, yaml.as_bytes(), DEFAULT_BACKUP_RETENTION)?;
            tracing::info!(state = %state_path.display(), "state reinitialized");
        }
        let dir = state_path.parent().expect("state path has a parent");
        Self::load(dir)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self, operation: &str) -> Result<ResourceLock> {
        ResourceLock::acquire(&self.state_path, operation, self.options.lock_timeout)
    }

    fn persist(&self, state: &VersionState) -> Result<()> {
        let yaml = serde_yaml::to_string(state).map_err(|e| PackdError::StateCorruption {
            path: self.state_path.clone(),
            reason: format!("serialize failed: {}", e),
        })?;
        write_atomic_with_backup(
            &self.state_path,
            yaml.as_bytes(),
            self.options.backup_retention,
        )
    }
}

/// Read and validate persisted state, seeding a default when absent
fn read_state(state_path: &Path) -> Result<VersionState> {
    if !state_path.exists() {
        return Ok(VersionState::default());
    }
    let content = std::fs::read_to_string(state_path)?;
    let state: VersionState =
        serde_yaml::from_str(&content).map_err(|e| PackdError::StateCorruption {
            path: state_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !state.label_matches_stage() {
        return Err(PackdError::StateCorruption {
            path: state_path.to_path_buf(),
            reason: format!(
                "prerelease label of {} does not match stage {}",
                state.current_version, state.current_stage
            ),
        });
    }
    Ok(state)
}

fn prune_history(state: &mut VersionState, retention: usize) {
    while state.history.len() > retention {
        state.history.remove(0);
    }
}

/// Compute the candidate for an increment kind against `state`
fn propose(
    state: &VersionState,
    kind: IncrementKind,
    explicit: Option<Version>,
) -> Result<VersionCandidate> {
    let current = &state.current_version;
    let stage = state.current_stage;

    if kind == IncrementKind::StageChange {
        return Err(PackdError::validation(
            "stage changes go through transition_stage, not propose_increment",
        ));
    }

    let target = match explicit {
        Some(v) => {
            if v <= *current {
                return Err(PackdError::validation(format!(
                    "explicit version {} does not advance past {}",
                    v, current
                )));
            }
            check_label_fits_stage(&v, stage)?;
            v
        }
        None => compute_target(current, stage, kind)?,
    };

    Ok(VersionCandidate {
        base: current.clone(),
        target,
        kind,
        stage,
    })
}

fn compute_target(current: &Version, stage: Stage, kind: IncrementKind) -> Result<Version> {
    let label = stage.prerelease_label();

    let mut target = match kind {
        IncrementKind::Major => Version::new(current.major + 1, 0, 0),
        IncrementKind::Minor => Version::new(current.major, current.minor + 1, 0),
        IncrementKind::Patch => Version::new(current.major, current.minor, current.patch + 1),
        IncrementKind::Prerelease => {
            let label = label.ok_or_else(|| {
                PackdError::validation(format!(
                    "prerelease increments are not valid in stage {}",
                    stage
                ))
            })?;
            return next_prerelease(current, label);
        }
        IncrementKind::StageChange => unreachable!("rejected above"),
    };

    if let Some(label) = label {
        target.pre = Prerelease::new(&format!("{}.1", label))?;
    }
    Ok(target)
}

/// Next prerelease: bump the counter when the label matches, otherwise
/// seed `<label>.1` — on the same numeric core if the version already
/// carries a label, on the next patch if it is bare.
fn next_prerelease(current: &Version, label: &str) -> Result<Version> {
    let prefix = format!("{}.", label);
    let mut target = Version::new(current.major, current.minor, current.patch);

    if let Some(counter) = current.pre.as_str().strip_prefix(&prefix) {
        let n: u64 = counter.parse().map_err(|_| {
            PackdError::validation(format!(
                "cannot bump non-numeric prerelease counter '{}'",
                current.pre
            ))
        })?;
        target.pre = Prerelease::new(&format!("{}.{}", label, n + 1))?;
    } else if current.pre.is_empty() {
        target.patch += 1;
        target.pre = Prerelease::new(&format!("{}.1", label))?;
    } else {
        // Label mismatch (e.g. state imported mid-stage): re-seed
        target.pre = Prerelease::new(&format!("{}.1", label))?;
    }
    Ok(target)
}

fn check_label_fits_stage(version: &Version, stage: Stage) -> Result<()> {
    let pre = version.pre.as_str();
    let ok = match stage.prerelease_label() {
        Some(label) => pre.is_empty() || pre == label || pre.starts_with(&format!("{}.", label)),
        None => pre.is_empty(),
    };
    if ok {
        Ok(())
    } else {
        Err(PackdError::validation(format!(
            "prerelease label of {} does not fit stage {}",
            version, stage
        )))
    }
}

/// Rewrite a version's prerelease label for a new stage
fn relabel_for_stage(current: &Version, target: Stage) -> Result<Version> {
    let mut version = current.clone();
    match target.prerelease_label() {
        None => version.pre = Prerelease::EMPTY,
        Some(label) => {
            if !current.pre.is_empty() {
                version.pre = Prerelease::new(&format!("{}.1", label))?;
            }
        }
    }
    Ok(version)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> VersionStateManager {
        VersionStateManager::load(temp.path()).unwrap()
    }

    #[test]
    fn test_fresh_state_is_seeded() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp);
        assert_eq!(mgr.current_state().current_version, Version::new(0, 0, 0));
        assert_eq!(mgr.current_state().current_stage, Stage::Dev);
        // Nothing persisted until the first mutation
        assert!(!temp.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_alpha_prerelease_scenario() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);

        mgr.transition_stage(Stage::Alpha).unwrap();
        let candidate = mgr
            .propose_increment(IncrementKind::Prerelease, None)
            .unwrap();
        mgr.commit_increment(&candidate).unwrap();

        assert_eq!(
            mgr.current_state().current_version,
            Version::parse("0.0.1-alpha.1").unwrap()
        );
        assert_eq!(mgr.current_state().current_stage, Stage::Alpha);
    }

    #[test]
    fn test_prerelease_counter_bumps() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();

        for expected in ["0.0.1-alpha.1", "0.0.1-alpha.2", "0.0.1-alpha.3"] {
            let c = mgr
                .propose_increment(IncrementKind::Prerelease, None)
                .unwrap();
            mgr.commit_increment(&c).unwrap();
            assert_eq!(
                mgr.current_state().current_version,
                Version::parse(expected).unwrap()
            );
        }
    }

    #[test]
    fn test_persisted_state_survives_reload() {
        let temp = TempDir::new().unwrap();
        {
            let mut mgr = manager(&temp);
            mgr.transition_stage(Stage::Alpha).unwrap();
            let c = mgr.propose_increment(IncrementKind::Minor, None).unwrap();
            mgr.commit_increment(&c).unwrap();
        }
        let mgr = manager(&temp);
        assert_eq!(
            mgr.current_state().current_version,
            Version::parse("0.1.0-alpha.1").unwrap()
        );
        assert_eq!(mgr.current_state().current_stage, Stage::Alpha);
        assert_eq!(mgr.current_state().history.len(), 1);
        assert_eq!(mgr.current_state().stage_transitions.len(), 1);
    }

    #[test]
    fn test_history_length_matches_commits_and_is_monotonic() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();

        for _ in 0..5 {
            let c = mgr
                .propose_increment(IncrementKind::Prerelease, None)
                .unwrap();
            mgr.commit_increment(&c).unwrap();
        }

        let history = mgr.current_state().history.clone();
        assert_eq!(history.len(), 5);
        for pair in history.windows(2) {
            assert!(pair[0].to_version < pair[1].to_version);
            assert_eq!(pair[0].to_version, pair[1].from_version);
        }
    }

    #[test]
    fn test_history_pruned_oldest_first() {
        let temp = TempDir::new().unwrap();
        let mut mgr = VersionStateManager::load_with(
            temp.path(),
            StateOptions {
                history_retention: 3,
                ..Default::default()
            },
        )
        .unwrap();
        mgr.transition_stage(Stage::Alpha).unwrap();

        for _ in 0..6 {
            let c = mgr
                .propose_increment(IncrementKind::Prerelease, None)
                .unwrap();
            mgr.commit_increment(&c).unwrap();
        }

        let history = &mgr.current_state().history;
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.first().unwrap().to_version,
            Version::parse("0.0.1-alpha.4").unwrap()
        );
        assert_eq!(
            history.last().unwrap().to_version,
            Version::parse("0.0.1-alpha.6").unwrap()
        );
    }

    #[test]
    fn test_illegal_transition_leaves_state_untouched() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);

        let before = mgr.current_state().clone();
        let err = mgr.transition_stage(Stage::Stable).unwrap_err();
        assert!(matches!(err, PackdError::Validation(_)));
        assert_eq!(*mgr.current_state(), before);
        assert!(!temp.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_stale_candidate_rejected() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();

        let stale = mgr
            .propose_increment(IncrementKind::Prerelease, None)
            .unwrap();
        let fresh = mgr
            .propose_increment(IncrementKind::Prerelease, None)
            .unwrap();
        mgr.commit_increment(&fresh).unwrap();

        let err = mgr.commit_increment(&stale).unwrap_err();
        assert!(matches!(err, PackdError::Validation(_)));
        assert_eq!(mgr.current_state().history.len(), 1);
    }

    #[test]
    fn test_explicit_version_must_advance() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();
        let c = mgr
            .propose_increment(
                IncrementKind::Minor,
                Some(Version::parse("0.2.0-alpha.1").unwrap()),
            )
            .unwrap();
        mgr.commit_increment(&c).unwrap();

        let err = mgr
            .propose_increment(IncrementKind::Patch, Some(Version::parse("0.1.0").unwrap()))
            .unwrap_err();
        assert!(matches!(err, PackdError::Validation(_)));
    }

    #[test]
    fn test_prerelease_invalid_without_label_stage() {
        let state = VersionState {
            current_stage: Stage::Release,
            current_version: Version::parse("1.0.0").unwrap(),
            ..Default::default()
        };
        let err = propose(&state, IncrementKind::Prerelease, None).unwrap_err();
        assert!(matches!(err, PackdError::Validation(_)));
    }

    #[test]
    fn test_transition_to_release_strips_label() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();
        let c = mgr
            .propose_increment(IncrementKind::Prerelease, None)
            .unwrap();
        mgr.commit_increment(&c).unwrap();

        mgr.transition_stage(Stage::Beta).unwrap();
        assert_eq!(
            mgr.current_state().current_version,
            Version::parse("0.0.1-beta.1").unwrap()
        );

        mgr.transition_stage(Stage::Rc).unwrap();
        mgr.transition_stage(Stage::Release).unwrap();
        assert_eq!(
            mgr.current_state().current_version,
            Version::parse("0.0.1").unwrap()
        );
        // Relabeling commits stage-change records
        assert!(mgr
            .current_state()
            .history
            .iter()
            .any(|r| r.kind == IncrementKind::StageChange));
    }

    #[test]
    fn test_corrupt_state_is_a_typed_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(STATE_FILE), "{{ not yaml !").unwrap();
        let err = VersionStateManager::load(temp.path()).unwrap_err();
        assert!(matches!(err, PackdError::StateCorruption { .. }));
    }

    #[test]
    fn test_restore_from_backup_recovers_corruption() {
        let temp = TempDir::new().unwrap();
        {
            let mut mgr = manager(&temp);
            mgr.transition_stage(Stage::Alpha).unwrap();
            let c = mgr
                .propose_increment(IncrementKind::Prerelease, None)
                .unwrap();
            mgr.commit_increment(&c).unwrap();
        }

        // Corrupt the live file; the pre-commit snapshot is in backups/
        std::fs::write(temp.path().join(STATE_FILE), "garbage: [").unwrap();
        assert!(VersionStateManager::load(temp.path()).is_err());

        let mgr = VersionStateManager::restore_latest_backup(temp.path()).unwrap();
        // Latest backup predates the last commit
        assert_eq!(mgr.current_state().current_stage, Stage::Alpha);
    }

    #[test]
    fn test_reinitialize_reseeds() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(STATE_FILE), "garbage").unwrap();
        let mgr = VersionStateManager::reinitialize(temp.path()).unwrap();
        assert_eq!(mgr.current_state().current_version, Version::new(0, 0, 0));
        assert_eq!(mgr.current_state().current_stage, Stage::Dev);
    }

    #[test]
    fn test_suggestions_cover_stage_and_transitions() {
        let temp = TempDir::new().unwrap();
        let mut mgr = manager(&temp);
        mgr.transition_stage(Stage::Alpha).unwrap();

        let suggestions = mgr.suggest_next_versions(None).unwrap();
        assert!(suggestions
            .iter()
            .any(|c| c.kind == IncrementKind::Prerelease));
        assert!(suggestions
            .iter()
            .any(|c| c.kind == IncrementKind::StageChange && c.stage == Stage::Beta));

        let only_patch = mgr
            .suggest_next_versions(Some(IncrementKind::Patch))
            .unwrap();
        assert!(!only_patch.is_empty());
        assert!(only_patch.iter().all(|c| c.kind == IncrementKind::Patch));
    }
}
