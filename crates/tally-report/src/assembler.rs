//! Report assembly
//!
//! A pure function of a [`ResultSnapshot`] and [`ReportOptions`]: the same
//! inputs always serialize to the same bytes. Build failures are data here;
//! assembly only fails on structural inconsistencies.

use crate::collector::{ResultSnapshot, TargetResults};
use crate::error::ReportError;
use crate::options::ReportOptions;
use crate::report::{BuildReport, ConfiguredReportEntry, TargetReportEntry};
use crate::result::{BuildOutcome, OutputGroups};
use std::collections::BTreeMap;
use tally_artifact::{CellResolver, ConfigurationDescriptor, TargetLabel};

/// Combines collector state and options into a [`BuildReport`]
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    options: ReportOptions,
    cells: CellResolver,
}

impl ReportAssembler {
    #[must_use]
    pub fn new(options: ReportOptions, cells: CellResolver) -> Self {
        Self { options, cells }
    }

    /// # Errors
    /// `MissingConfiguration` when a requested target has no recorded
    /// configuration, and label errors when a target's cell is unknown
    pub fn assemble(&self, snapshot: &ResultSnapshot) -> Result<BuildReport, ReportError> {
        let mut failures = BTreeMap::new();
        let mut results = BTreeMap::new();

        for target in snapshot.requested() {
            let configs = snapshot
                .results_for(target)
                .filter(|configs| !configs.is_empty())
                .ok_or_else(|| {
                    tracing::error!(%target, "requested target has no recorded configuration");
                    ReportError::MissingConfiguration(target.to_string())
                })?;

            if let Some(reason) = configs.values().find_map(|r| r.failure_reason()) {
                failures.insert(target.clone(), reason);
            }
            results.insert(target.clone(), self.entry(target, configs, snapshot)?);
        }

        Ok(BuildReport {
            trace_id: self.options.trace_id.clone(),
            success: failures.is_empty(),
            failures,
            results,
            project_root: self.options.project_root.clone(),
            truncated: snapshot.is_truncated(),
        })
    }

    fn entry(
        &self,
        target: &TargetLabel,
        configs: &TargetResults,
        snapshot: &ResultSnapshot,
    ) -> Result<TargetReportEntry, ReportError> {
        let fill = self.options.fill_out_failures;
        let configured = configs
            .iter()
            .map(|(cfg, result)| (cfg.clone(), ConfiguredReportEntry::from_result(result, fill)))
            .collect::<BTreeMap<_, _>>();

        let unconfigured = self
            .options
            .include_unconfigured_section
            .then(|| unconfigured_view(target, &configured, snapshot.default_configuration()));

        let package_project_relative_path = if self.options.include_package_relative_paths {
            Some(self.cells.package_project_relative_path(target)?)
        } else {
            None
        };

        Ok(TargetReportEntry {
            unconfigured,
            package_project_relative_path,
            configured,
        })
    }
}

/// Select or derive the configuration-independent view of a target
///
/// One configuration is copied as is. With several, the default
/// configuration wins when it was built; otherwise the views are merged.
fn unconfigured_view(
    target: &TargetLabel,
    configured: &BTreeMap<ConfigurationDescriptor, ConfiguredReportEntry>,
    default: Option<&ConfigurationDescriptor>,
) -> ConfiguredReportEntry {
    if configured.len() == 1 {
        if let Some(only) = configured.values().next() {
            return only.clone();
        }
    }
    if let Some(chosen) = default.and_then(|cfg| configured.get(cfg)) {
        return chosen.clone();
    }

    tracing::warn!(
        %target,
        configurations = configured.len(),
        "no default configuration among built configurations, merging unconfigured view"
    );
    merge(configured.values())
}

fn merge<'a>(entries: impl Iterator<Item = &'a ConfiguredReportEntry>) -> ConfiguredReportEntry {
    let mut merged = ConfiguredReportEntry {
        success: BuildOutcome::Success,
        outputs: OutputGroups::new(),
        other_outputs: OutputGroups::new(),
        configured_graph_size: None,
        errors: Vec::new(),
    };
    for entry in entries {
        if entry.success == BuildOutcome::Fail {
            merged.success = BuildOutcome::Fail;
        }
        extend_groups(&mut merged.outputs, &entry.outputs);
        extend_groups(&mut merged.other_outputs, &entry.other_outputs);
        merged.configured_graph_size =
            merged.configured_graph_size.max(entry.configured_graph_size);
        merged.errors.extend(entry.errors.iter().cloned());
    }
    if merged.success == BuildOutcome::Fail {
        merged.outputs.clear();
        merged.other_outputs.clear();
    }
    merged
}

fn extend_groups(into: &mut OutputGroups, from: &OutputGroups) {
    for (group, paths) in from {
        let slot = into.entry(group.clone()).or_default();
        for path in paths {
            if !slot.contains(path) {
                slot.push(path.clone());
            }
        }
    }
}
