//! Concurrent result accumulation
//!
//! Every configured build registers an obligation with
//! [`TargetResultCollector::expect`] before it is scheduled and discharges it
//! with exactly one [`TargetResultCollector::record`]. Results are
//! partitioned per target in a sharded map, so concurrent records for
//! different targets never contend on one lock.
//!
//! Finalization is a join point: [`TargetResultCollector::finalize`]
//! suspends until the outstanding count reaches zero or the invocation is
//! aborted.

use crate::error::ReportError;
use crate::result::{BuildFailure, ConfiguredResult, OutputGroups, TargetOutputs};
use dashmap::{DashMap, DashSet};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tally_artifact::{
    ActionOutput, ConfigurationDescriptor, ConfiguredTargetKey, OutputPathResolver, TargetLabel,
};
use tally_graph::{GraphError, GraphSizeComputer};
use tokio::sync::watch;

/// Reason recorded for obligations still open when a best-effort report is taken
pub const CANCELLED_REASON: &str = "build cancelled before completion";

/// Results of one target, keyed by configuration
pub type TargetResults = BTreeMap<ConfigurationDescriptor, ConfiguredResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Abort {
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
struct Status {
    outstanding: usize,
    abort: Option<Abort>,
}

impl Status {
    fn settled(&self) -> bool {
        self.outstanding == 0 || self.abort.is_some()
    }
}

/// Frozen view of the collector, read by the assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSnapshot {
    requested: Vec<TargetLabel>,
    results: BTreeMap<TargetLabel, TargetResults>,
    default_configuration: Option<ConfigurationDescriptor>,
    truncated: bool,
}

impl ResultSnapshot {
    /// Snapshot from already-collected results
    #[must_use]
    pub fn new(
        requested: impl IntoIterator<Item = TargetLabel>,
        results: BTreeMap<TargetLabel, TargetResults>,
    ) -> Self {
        Self {
            requested: dedup_requested(requested),
            results,
            default_configuration: None,
            truncated: false,
        }
    }

    #[must_use]
    pub fn with_default_configuration(
        mut self,
        configuration: Option<ConfigurationDescriptor>,
    ) -> Self {
        self.default_configuration = configuration;
        self
    }

    /// Requested top-level targets, deduplicated, in request order
    #[inline]
    #[must_use]
    pub fn requested(&self) -> &[TargetLabel] {
        &self.requested
    }

    #[must_use]
    pub fn results_for(&self, target: &TargetLabel) -> Option<&TargetResults> {
        self.results.get(target)
    }

    /// Configuration picked by default resolution, if the engine supplied one
    #[inline]
    #[must_use]
    pub fn default_configuration(&self) -> Option<&ConfigurationDescriptor> {
        self.default_configuration.as_ref()
    }

    /// Whether open obligations were filled in after a cancellation
    #[inline]
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

fn dedup_requested(requested: impl IntoIterator<Item = TargetLabel>) -> Vec<TargetLabel> {
    let mut seen = BTreeSet::new();
    requested
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// Thread-safe accumulator of configured results for one invocation
#[derive(Debug)]
pub struct TargetResultCollector {
    results: DashMap<TargetLabel, TargetResults>,
    expected: DashSet<ConfiguredTargetKey>,
    resolver: OutputPathResolver,
    graph_sizes: Option<Arc<GraphSizeComputer>>,
    default_configuration: Option<ConfigurationDescriptor>,
    status: watch::Sender<Status>,
}

impl TargetResultCollector {
    #[must_use]
    pub fn new(resolver: OutputPathResolver) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            results: DashMap::new(),
            expected: DashSet::new(),
            resolver,
            graph_sizes: None,
            default_configuration: None,
            status,
        }
    }

    /// Attach `configured_graph_size` to every recorded result
    #[must_use]
    pub fn with_graph_sizes(mut self, sizes: Arc<GraphSizeComputer>) -> Self {
        self.graph_sizes = Some(sizes);
        self
    }

    #[must_use]
    pub fn with_default_configuration(
        mut self,
        configuration: Option<ConfigurationDescriptor>,
    ) -> Self {
        self.default_configuration = configuration;
        self
    }

    /// Register an obligation for `(target, configuration)`
    ///
    /// Returns `false` if the pair was already expected.
    pub fn expect(&self, target: TargetLabel, configuration: ConfigurationDescriptor) -> bool {
        let fresh = self
            .expected
            .insert(ConfiguredTargetKey::new(target, configuration));
        if fresh {
            self.status.send_modify(|s| s.outstanding += 1);
        }
        fresh
    }

    /// Obligations not yet recorded
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.status.borrow().outstanding
    }

    /// Record the terminal outcome of one configured build
    ///
    /// # Errors
    /// Structural errors for a duplicate or unexpected pair, an output that
    /// cannot be resolved, or a cycle found while sizing the graph.
    pub fn record(
        &self,
        target: TargetLabel,
        configuration: ConfigurationDescriptor,
        outcome: Result<TargetOutputs, Vec<BuildFailure>>,
    ) -> Result<(), ReportError> {
        let key = ConfiguredTargetKey::new(target, configuration);
        if !self.expected.contains(&key) {
            tracing::error!(key = %key, "result recorded for a pair that was never expected");
            return Err(ReportError::UnexpectedResult {
                target: key.label.to_string(),
                configuration: key.configuration.to_string(),
            });
        }

        let result = match outcome {
            Ok(raw) => ConfiguredResult::success(
                self.resolve_groups(&raw.outputs)?,
                self.resolve_groups(&raw.other_outputs)?,
            ),
            Err(errors) => ConfiguredResult::failure(errors),
        };
        let result = result.with_graph_size(self.graph_size(&key)?);
        let success = result.is_success();

        {
            let mut per_target = self.results.entry(key.label.clone()).or_default();
            match per_target.entry(key.configuration.clone()) {
                Entry::Occupied(_) => {
                    tracing::error!(key = %key, "duplicate result");
                    return Err(ReportError::DuplicateResult {
                        target: key.label.to_string(),
                        configuration: key.configuration.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(result);
                }
            }
        }

        self.status
            .send_modify(|s| s.outstanding = s.outstanding.saturating_sub(1));
        tracing::debug!(key = %key, success, outstanding = self.outstanding(), "recorded result");
        Ok(())
    }

    /// Signal cancellation from the execution engine
    pub fn cancel(&self) {
        tracing::warn!(outstanding = self.outstanding(), "build cancelled");
        self.status.send_modify(|s| {
            s.abort.get_or_insert(Abort::Cancelled);
        });
    }

    /// Signal an unrecoverable build-wide failure
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "build aborted");
        self.status.send_modify(|s| {
            s.abort.get_or_insert(Abort::Failed(reason));
        });
    }

    /// Wait for every obligation, then freeze the results
    ///
    /// # Errors
    /// `Cancelled` or `BuildAborted` if the invocation was aborted while
    /// obligations were still outstanding.
    pub async fn finalize(&self, requested: &[TargetLabel]) -> Result<ResultSnapshot, ReportError> {
        let status = self.settle().await;
        if status.outstanding > 0 {
            return Err(match status.abort {
                Some(Abort::Failed(reason)) => ReportError::BuildAborted(reason),
                Some(Abort::Cancelled) | None => ReportError::Cancelled,
            });
        }
        tracing::info!(targets = requested.len(), "results finalized");
        Ok(self.snapshot(requested, false))
    }

    /// Like [`finalize`](Self::finalize), but an aborted invocation still
    /// yields a snapshot: every open obligation is recorded as a failure with
    /// [`CANCELLED_REASON`] and the snapshot is marked truncated.
    ///
    /// # Errors
    /// Only if a late result collides with a filled-in obligation.
    pub async fn finalize_best_effort(
        &self,
        requested: &[TargetLabel],
    ) -> Result<ResultSnapshot, ReportError> {
        let status = self.settle().await;
        if status.outstanding == 0 {
            return Ok(self.snapshot(requested, false));
        }

        let mut filled = 0usize;
        for key in self.expected.iter() {
            let mut per_target = self.results.entry(key.label.clone()).or_default();
            if let Entry::Vacant(slot) = per_target.entry(key.configuration.clone()) {
                slot.insert(ConfiguredResult::failure(vec![BuildFailure::new(CANCELLED_REASON)]));
                filled += 1;
            }
        }
        self.status.send_modify(|s| s.outstanding = 0);
        tracing::warn!(filled, "best-effort report with unfinished builds");
        Ok(self.snapshot(requested, true))
    }

    async fn settle(&self) -> Status {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(Status::settled).await {
            Ok(status) => status.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.status.borrow().clone(),
        };
        status
    }

    fn snapshot(&self, requested: &[TargetLabel], truncated: bool) -> ResultSnapshot {
        let results = self
            .results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        ResultSnapshot {
            requested: dedup_requested(requested.iter().cloned()),
            results,
            default_configuration: self.default_configuration.clone(),
            truncated,
        }
    }

    fn resolve_groups(
        &self,
        groups: &BTreeMap<String, Vec<ActionOutput>>,
    ) -> Result<OutputGroups, ReportError> {
        groups
            .iter()
            .map(|(group, outputs)| {
                let paths = outputs
                    .iter()
                    .map(|output| self.resolver.resolve(output))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((group.clone(), paths))
            })
            .collect()
    }

    fn graph_size(&self, key: &ConfiguredTargetKey) -> Result<Option<u64>, ReportError> {
        let Some(sizes) = &self.graph_sizes else {
            return Ok(None);
        };
        match sizes.size_of(key) {
            Ok(size) => Ok(Some(size)),
            Err(GraphError::UnknownTarget(_)) => {
                tracing::debug!(key = %key, "no configured graph node, size omitted");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
