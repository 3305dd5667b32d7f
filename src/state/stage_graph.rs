//! Allowed stage-transition graph
//!
//! The graph is data, not logic: the default encodes the linear
//! dev -> alpha -> beta -> rc -> release -> stable progression with a
//! hotfix branch reachable from any stage, and a custom graph can be
//! loaded from serialized form. Anything not listed is rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::errors::{PackdError, Result};
use crate::models::Stage;

/// Transition graph: for each stage, the stages it may move to.
///
/// Same-stage transitions (re-entrant increments) are always allowed and
/// need not be listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageGraph {
    edges: BTreeMap<Stage, Vec<Stage>>,
}

impl Default for StageGraph {
    fn default() -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(Stage::Dev, vec![Stage::Alpha, Stage::Hotfix]);
        edges.insert(Stage::Alpha, vec![Stage::Beta, Stage::Hotfix]);
        edges.insert(Stage::Beta, vec![Stage::Rc, Stage::Hotfix]);
        edges.insert(Stage::Rc, vec![Stage::Release, Stage::Hotfix]);
        edges.insert(Stage::Release, vec![Stage::Stable, Stage::Hotfix]);
        edges.insert(Stage::Stable, vec![Stage::Hotfix]);
        edges.insert(Stage::Hotfix, vec![Stage::Release]);
        Self { edges }
    }
}

impl StageGraph {
    /// Build a graph from explicit edges. Stages absent from the map
    /// allow no outgoing transitions (besides same-stage).
    pub fn from_edges(edges: BTreeMap<Stage, Vec<Stage>>) -> Self {
        Self { edges }
    }

    /// Whether `from -> to` is an allowed transition
    pub fn allows(&self, from: Stage, to: Stage) -> bool {
        if from == to {
            return true;
        }
        self.edges
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// Validate a transition, describing the allowed targets on failure
    pub fn check(&self, from: Stage, to: Stage) -> Result<()> {
        if self.allows(from, to) {
            return Ok(());
        }
        let allowed: Vec<&str> = self
            .edges
            .get(&from)
            .map(|targets| targets.iter().map(|s| s.name()).collect())
            .unwrap_or_default();
        Err(PackdError::validation(format!(
            "stage transition {} -> {} is not allowed (allowed from {}: {})",
            from,
            to,
            from,
            if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed.join(", ")
            }
        )))
    }

    /// Stages reachable from `from`, in graph order
    pub fn targets(&self, from: Stage) -> &[Stage] {
        self.edges.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_progression() {
        let graph = StageGraph::default();
        assert!(graph.allows(Stage::Dev, Stage::Alpha));
        assert!(graph.allows(Stage::Alpha, Stage::Beta));
        assert!(graph.allows(Stage::Beta, Stage::Rc));
        assert!(graph.allows(Stage::Rc, Stage::Release));
        assert!(graph.allows(Stage::Release, Stage::Stable));
    }

    #[test]
    fn test_skipping_stages_rejected() {
        let graph = StageGraph::default();
        assert!(!graph.allows(Stage::Dev, Stage::Beta));
        assert!(!graph.allows(Stage::Beta, Stage::Stable));
        assert!(!graph.allows(Stage::Alpha, Stage::Release));
        // No moving backwards either
        assert!(!graph.allows(Stage::Release, Stage::Alpha));
    }

    #[test]
    fn test_same_stage_always_allowed() {
        let graph = StageGraph::default();
        for stage in [Stage::Dev, Stage::Beta, Stage::Stable, Stage::Hotfix] {
            assert!(graph.allows(stage, stage));
        }
    }

    #[test]
    fn test_hotfix_reachable_from_anywhere_and_exits_to_release() {
        let graph = StageGraph::default();
        for stage in [
            Stage::Dev,
            Stage::Alpha,
            Stage::Beta,
            Stage::Rc,
            Stage::Release,
            Stage::Stable,
        ] {
            assert!(graph.allows(stage, Stage::Hotfix), "{} -> hotfix", stage);
        }
        assert!(graph.allows(Stage::Hotfix, Stage::Release));
        assert!(!graph.allows(Stage::Hotfix, Stage::Stable));
    }

    #[test]
    fn test_check_error_lists_allowed_targets() {
        let graph = StageGraph::default();
        let err = graph.check(Stage::Dev, Stage::Stable).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dev -> stable"));
        assert!(msg.contains("alpha"));
    }

    #[test]
    fn test_custom_graph_roundtrips_through_serde() {
        let mut edges = BTreeMap::new();
        edges.insert(Stage::Beta, vec![Stage::Stable]);
        let graph = StageGraph::from_edges(edges);
        assert!(graph.allows(Stage::Beta, Stage::Stable));

        let yaml = serde_yaml::to_string(&graph).unwrap();
        let back: StageGraph = serde_yaml::from_str(&yaml).unwrap();
        assert!(back.allows(Stage::Beta, Stage::Stable));
        assert!(!back.allows(Stage::Dev, Stage::Alpha));
    }
}
