//! Public report document
//!
//! Optional fields are `Option`s skipped during serialization, so a disabled
//! section is absent from the JSON rather than present and empty.

use crate::result::{BuildFailure, BuildOutcome, ConfiguredResult, OutputGroups};
use serde::Serialize;
use std::collections::BTreeMap;
use tally_artifact::{ConfigurationDescriptor, TargetLabel};

/// The assembled build report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub trace_id: String,
    pub success: bool,
    pub failures: BTreeMap<TargetLabel, String>,
    pub results: BTreeMap<TargetLabel, TargetReportEntry>,
    pub project_root: String,
    pub truncated: bool,
}

/// Everything reported for one requested target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReportEntry {
    /// Configuration-independent view, flattened into the target object
    #[serde(flatten)]
    pub unconfigured: Option<ConfiguredReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_project_relative_path: Option<String>,
    pub configured: BTreeMap<ConfigurationDescriptor, ConfiguredReportEntry>,
}

/// Public shape of one [`ConfiguredResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredReportEntry {
    pub success: BuildOutcome,
    pub outputs: OutputGroups,
    pub other_outputs: OutputGroups,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_graph_size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BuildFailure>,
}

impl ConfiguredReportEntry {
    /// Translate a result; failure details are kept only when requested
    #[must_use]
    pub fn from_result(result: &ConfiguredResult, fill_out_failures: bool) -> Self {
        Self {
            success: result.outcome(),
            outputs: result.outputs().clone(),
            other_outputs: result.other_outputs().clone(),
            configured_graph_size: result.configured_graph_size(),
            errors: if fill_out_failures {
                result.errors().to_vec()
            } else {
                Vec::new()
            },
        }
    }
}
