//! Per-configuration build results

use serde::Serialize;
use std::collections::BTreeMap;
use tally_artifact::{ActionOutput, OutputPath};

/// Output groups keyed by group name (`DEFAULT` or a sub-target name)
pub type OutputGroups = BTreeMap<String, Vec<OutputPath>>;

/// Terminal outcome of one configured build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildOutcome {
    Success,
    Fail,
}

/// Why a configured build failed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildFailure {
    pub message: String,
    /// The failing action, when the failure is attributable to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl BuildFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action: None,
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: impl ToString) -> Self {
        self.action = Some(action.to_string());
        self
    }
}

/// Raw outputs of a successful configured build, before path resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOutputs {
    pub outputs: BTreeMap<String, Vec<ActionOutput>>,
    pub other_outputs: BTreeMap<String, Vec<ActionOutput>>,
}

/// Immutable outcome of one target under one configuration
///
/// Failed results never carry outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredResult {
    outcome: BuildOutcome,
    outputs: OutputGroups,
    other_outputs: OutputGroups,
    configured_graph_size: Option<u64>,
    errors: Vec<BuildFailure>,
}

impl ConfiguredResult {
    #[must_use]
    pub fn success(outputs: OutputGroups, other_outputs: OutputGroups) -> Self {
        Self {
            outcome: BuildOutcome::Success,
            outputs,
            other_outputs,
            configured_graph_size: None,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn failure(errors: Vec<BuildFailure>) -> Self {
        Self {
            outcome: BuildOutcome::Fail,
            outputs: OutputGroups::new(),
            other_outputs: OutputGroups::new(),
            configured_graph_size: None,
            errors,
        }
    }

    #[must_use]
    pub fn with_graph_size(mut self, size: Option<u64>) -> Self {
        self.configured_graph_size = size;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == BuildOutcome::Success
    }

    #[inline]
    #[must_use]
    pub fn outcome(&self) -> BuildOutcome {
        self.outcome
    }

    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &OutputGroups {
        &self.outputs
    }

    #[inline]
    #[must_use]
    pub fn other_outputs(&self) -> &OutputGroups {
        &self.other_outputs
    }

    #[inline]
    #[must_use]
    pub fn configured_graph_size(&self) -> Option<u64> {
        self.configured_graph_size
    }

    #[inline]
    #[must_use]
    pub fn errors(&self) -> &[BuildFailure] {
        &self.errors
    }

    /// One-line reason for a failed result
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        Some(match self.errors.as_slice() {
            [] => "build failed".to_string(),
            [only] => only.message.clone(),
            [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_has_no_outputs() {
        let result = ConfiguredResult::failure(vec![BuildFailure::new("boom")]);
        assert!(!result.is_success());
        assert!(result.outputs().is_empty());
        assert!(result.other_outputs().is_empty());
        assert_eq!(result.failure_reason().as_deref(), Some("boom"));
    }

    #[test]
    fn failure_reason_summarizes_multiple_errors() {
        let result = ConfiguredResult::failure(vec![
            BuildFailure::new("first"),
            BuildFailure::new("second"),
            BuildFailure::new("third"),
        ]);
        assert_eq!(result.failure_reason().as_deref(), Some("first (and 2 more)"));
        assert_eq!(
            ConfiguredResult::failure(Vec::new()).failure_reason().as_deref(),
            Some("build failed")
        );
    }

    #[test]
    fn outcome_serializes_screaming() {
        assert_eq!(serde_json::to_string(&BuildOutcome::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(serde_json::to_string(&BuildOutcome::Fail).unwrap(), "\"FAIL\"");
    }

    #[test]
    fn success_keeps_graph_size() {
        let result = ConfiguredResult::success(OutputGroups::new(), OutputGroups::new())
            .with_graph_size(Some(3));
        assert!(result.is_success());
        assert_eq!(result.configured_graph_size(), Some(3));
        assert_eq!(result.failure_reason(), None);
    }
}
