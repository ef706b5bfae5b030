//! JSON build plans
//!
//! A build plan declares a small project: its cells, its targets with their
//! dependencies and outputs, the configurations each target is built under
//! and which builds fail. [`PlanBuilder`] executes such a plan as a
//! [`TargetBuilder`], which is how the `tally` binary and the integration
//! tests drive the report pipeline.
//!
//! ```json
//! {
//!   "root_cell": "root",
//!   "targets": {
//!     "//:rule1": { "deps": ["//:dep1"], "outputs": { "DEFAULT": ["out.txt"] } },
//!     "//:dep1": {}
//!   }
//! }
//! ```
//!
//! Output content is simulated: each declared output gets a content hash
//! derived from its owner, configuration and path.

use crate::error::{PlanError, ReportError};
use crate::invocation::TargetBuilder;
use crate::result::{BuildFailure, TargetOutputs};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;
use tally_artifact::{
    ActionKey, ActionOutput, CellName, CellResolver, ConfigurationDescriptor, ConfiguredTargetKey,
    ContentHash, ProvidersName, TargetLabel,
};
use tally_graph::ConfiguredGraph;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default = "default_root_cell")]
    root_cell: String,
    #[serde(default)]
    cells: BTreeMap<String, String>,
    #[serde(default)]
    default_configuration: Option<String>,
    targets: BTreeMap<String, RawTarget>,
}

fn default_root_cell() -> String {
    "root".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    outputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    other_outputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    configurations: Vec<String>,
    /// Failure message; the build fails under every configuration unless
    /// `fail_configurations` narrows it
    #[serde(default)]
    fail: Option<String>,
    #[serde(default)]
    fail_configurations: Vec<String>,
    /// Simulated build latency
    #[serde(default)]
    delay_ms: u64,
}

#[derive(Debug)]
struct PlannedTarget {
    deps: Vec<TargetLabel>,
    outputs: BTreeMap<String, Vec<String>>,
    other_outputs: BTreeMap<String, Vec<String>>,
    configurations: Vec<ConfigurationDescriptor>,
    fail: Option<String>,
    fail_configurations: BTreeSet<ConfigurationDescriptor>,
    delay: Duration,
}

impl PlannedTarget {
    fn fails_in(&self, configuration: &ConfigurationDescriptor) -> Option<&str> {
        let message = self.fail.as_deref()?;
        (self.fail_configurations.is_empty() || self.fail_configurations.contains(configuration))
            .then_some(message)
    }

    /// Stable action index of each declared output path
    fn action_index(&self, short_path: &str) -> u32 {
        let mut seen = Vec::<&str>::new();
        for path in self.outputs.values().chain(self.other_outputs.values()).flatten() {
            if !seen.contains(&path.as_str()) {
                seen.push(path.as_str());
            }
        }
        let position = seen.iter().position(|p| *p == short_path).unwrap_or(seen.len());
        u32::try_from(position).unwrap_or(u32::MAX)
    }
}

/// Executes a JSON build plan
#[derive(Debug)]
pub struct PlanBuilder {
    cells: CellResolver,
    default_configuration: Option<ConfigurationDescriptor>,
    targets: BTreeMap<TargetLabel, PlannedTarget>,
}

impl PlanBuilder {
    /// Parse a plan from JSON text
    ///
    /// # Errors
    /// Malformed JSON, labels or cells, and dependencies on undeclared targets
    pub fn from_json(source: &str) -> Result<Self, PlanError> {
        let raw: RawPlan = serde_json::from_str(source)?;
        let root = CellName::new(raw.root_cell)?;
        let mut cells = CellResolver::new(root.clone());
        for (name, path) in raw.cells {
            cells.insert(CellName::new(name)?, path)?;
        }

        let parse_cfg = |s: &str| s.parse::<ConfigurationDescriptor>();
        let mut targets = BTreeMap::new();
        for (label, target) in raw.targets {
            let label = TargetLabel::parse_relative(&label, &root)?;
            cells.project_relative_path(label.cell())?;

            let deps = target
                .deps
                .iter()
                .map(|dep| TargetLabel::parse_relative(dep, &root))
                .collect::<Result<Vec<_>, _>>()?;
            let mut configurations = Vec::with_capacity(target.configurations.len());
            for raw in &target.configurations {
                let configuration = parse_cfg(raw)?;
                if !configurations.contains(&configuration) {
                    configurations.push(configuration);
                }
            }
            if configurations.is_empty() {
                configurations.push(ConfigurationDescriptor::Unspecified);
            }
            let fail_configurations = target
                .fail_configurations
                .iter()
                .map(|c| parse_cfg(c))
                .collect::<Result<BTreeSet<_>, _>>()?;

            targets.insert(
                label,
                PlannedTarget {
                    deps,
                    outputs: target.outputs,
                    other_outputs: target.other_outputs,
                    configurations,
                    fail: target.fail,
                    fail_configurations,
                    delay: Duration::from_millis(target.delay_ms),
                },
            );
        }

        for (label, target) in &targets {
            if let Some(missing) = target.deps.iter().find(|dep| !targets.contains_key(*dep)) {
                return Err(PlanError::UnknownTarget(format!("{missing} (dependency of {label})")));
            }
        }

        let default_configuration = raw
            .default_configuration
            .as_deref()
            .map(parse_cfg)
            .transpose()?;

        tracing::debug!(targets = targets.len(), "loaded build plan");
        Ok(Self {
            cells,
            default_configuration,
            targets,
        })
    }

    /// Read and parse a plan file
    ///
    /// # Errors
    /// I/O errors plus everything [`PlanBuilder::from_json`] rejects
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let source = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source)
    }

    /// The root cell patterns are resolved against
    #[must_use]
    pub fn root_cell(&self) -> &CellName {
        self.cells.root_cell()
    }

    fn target(&self, label: &TargetLabel) -> Result<&PlannedTarget, PlanError> {
        self.targets
            .get(label)
            .ok_or_else(|| PlanError::UnknownTarget(label.to_string()))
    }

    fn declare(
        key: &ConfiguredTargetKey,
        target: &PlannedTarget,
        paths: &[String],
    ) -> Vec<ActionOutput> {
        paths
            .iter()
            .map(|path| {
                let content = ContentHash::compute_parts([
                    key.label.to_string().as_bytes(),
                    key.configuration.to_string().as_bytes(),
                    path.as_bytes(),
                ]);
                let action = ActionKey::new(key.clone(), target.action_index(path));
                ActionOutput::declared(action, path.clone()).executed(content)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl TargetBuilder for PlanBuilder {
    fn cells(&self) -> &CellResolver {
        &self.cells
    }

    fn default_configuration(&self) -> Option<ConfigurationDescriptor> {
        self.default_configuration.clone()
    }

    fn configurations(
        &self,
        target: &TargetLabel,
    ) -> Result<Vec<ConfigurationDescriptor>, ReportError> {
        Ok(self.target(target)?.configurations.clone())
    }

    fn configure(
        &self,
        key: &ConfiguredTargetKey,
        graph: &ConfiguredGraph,
    ) -> Result<(), ReportError> {
        // Dependencies are configured under their dependent's configuration.
        graph.add_node(key);
        let mut visited = HashSet::from([key.label.clone()]);
        let mut stack = vec![key.label.clone()];
        while let Some(label) = stack.pop() {
            let from = ConfiguredTargetKey::new(label.clone(), key.configuration.clone());
            for dep in &self.target(&label)?.deps {
                let to = ConfiguredTargetKey::new(dep.clone(), key.configuration.clone());
                graph.add_dep(&from, &to).map_err(PlanError::from)?;
                if visited.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
        Ok(())
    }

    async fn build(
        &self,
        key: &ConfiguredTargetKey,
        providers: &[ProvidersName],
    ) -> Result<TargetOutputs, Vec<BuildFailure>> {
        let target = self
            .target(&key.label)
            .map_err(|err| vec![BuildFailure::new(err.to_string())])?;
        if !target.delay.is_zero() {
            tokio::time::sleep(target.delay).await;
        }

        if let Some(message) = target.fails_in(&key.configuration) {
            let action = ActionKey::new(key.clone(), 0);
            tracing::debug!(key = %key, %message, "planned failure");
            return Err(vec![BuildFailure::new(message).with_action(action)]);
        }

        let mut built = TargetOutputs::default();
        for name in providers {
            let group = name.group_key();
            let paths: &[String] = match (target.outputs.get(group), name) {
                (Some(paths), _) => paths.as_slice(),
                (None, ProvidersName::Default) => &[],
                (None, ProvidersName::Named(sub)) => {
                    return Err(vec![BuildFailure::new(format!(
                        "unknown sub-target `{sub}` of {}",
                        key.label
                    ))]);
                }
            };
            built
                .outputs
                .insert(group.to_string(), Self::declare(key, target, paths));
            if let Some(other) = target.other_outputs.get(group) {
                built
                    .other_outputs
                    .insert(group.to_string(), Self::declare(key, target, other));
            }
        }
        Ok(built)
    }
}
