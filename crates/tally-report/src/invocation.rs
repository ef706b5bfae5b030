//! Build invocation driver
//!
//! Configures every requested target, schedules one task per
//! (target, configuration) on a [`JoinSet`], feeds outcomes into the
//! collector and finally assembles and writes the report.
//!
//! # Cancellation
//!
//! A [`Canceller`] flips a watch channel shared by all tasks. Running builds
//! are dropped, the collector is told, and the report is either skipped or
//! completed best-effort depending on [`BuildInvocation::with_best_effort`].

use crate::assembler::ReportAssembler;
use crate::collector::TargetResultCollector;
use crate::error::ReportError;
use crate::options::ReportOptions;
use crate::report::BuildReport;
use crate::result::{BuildFailure, TargetOutputs};
use crate::writer::ReportWriter;
use futures::future::{self, Either};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tally_artifact::{
    CellResolver, ConfigurationDescriptor, ConfiguredTargetKey, OutputPathResolver,
    ProvidersLabel, ProvidersName, TargetLabel,
};
use tally_graph::{ConfiguredGraph, GraphSizeComputer};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// The execution engine, as seen by the report subsystem
///
/// Implement this trait to plug in how targets are configured and built.
#[async_trait::async_trait]
pub trait TargetBuilder: Send + Sync {
    /// Cells known to the engine
    fn cells(&self) -> &CellResolver;

    /// Configuration chosen by default resolution, if any
    fn default_configuration(&self) -> Option<ConfigurationDescriptor>;

    /// Configurations a requested target is built under
    fn configurations(
        &self,
        target: &TargetLabel,
    ) -> Result<Vec<ConfigurationDescriptor>, ReportError>;

    /// Add `key` and its transitive configured dependencies to `graph`
    fn configure(
        &self,
        key: &ConfiguredTargetKey,
        graph: &ConfiguredGraph,
    ) -> Result<(), ReportError>;

    /// Build one configured target, producing the requested providers
    async fn build(
        &self,
        key: &ConfiguredTargetKey,
        providers: &[ProvidersName],
    ) -> Result<TargetOutputs, Vec<BuildFailure>>;
}

/// Requests cancellation of a running invocation
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// What a finished invocation produced
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub report: BuildReport,
    /// Set when the report was persisted
    pub written_to: Option<PathBuf>,
}

impl InvocationOutcome {
    /// Whether the process should exit successfully
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.report.success && !self.report.truncated
    }
}

/// One build invocation over a set of requested patterns
pub struct BuildInvocation {
    builder: Arc<dyn TargetBuilder>,
    options: ReportOptions,
    resolver: OutputPathResolver,
    best_effort: bool,
    cancel: Arc<watch::Sender<bool>>,
}

impl BuildInvocation {
    pub fn new(builder: Arc<dyn TargetBuilder>, options: ReportOptions) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            builder,
            options,
            resolver: OutputPathResolver::default(),
            best_effort: false,
            cancel: Arc::new(cancel),
        }
    }

    #[must_use]
    pub fn with_output_root(mut self, resolver: OutputPathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Still assemble and write a report after cancellation
    #[must_use]
    pub fn with_best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    #[must_use]
    pub fn canceller(&self) -> Canceller {
        Canceller {
            tx: Arc::clone(&self.cancel),
        }
    }

    /// Build `patterns` and produce the report
    ///
    /// # Errors
    /// Configuration errors from the engine, structural errors from the
    /// collector or assembler, cancellation without best-effort, and I/O
    /// errors writing the report. Failed target builds are not errors.
    pub async fn run(&self, patterns: &[ProvidersLabel]) -> Result<InvocationOutcome, ReportError> {
        let requests = group_patterns(patterns);
        let requested: Vec<TargetLabel> = requests.keys().cloned().collect();
        tracing::info!(targets = requested.len(), patterns = patterns.len(), "starting build");

        let graph = Arc::new(ConfiguredGraph::new());
        let mut collector = TargetResultCollector::new(self.resolver.clone())
            .with_default_configuration(self.builder.default_configuration());
        if self.options.log_configured_graph_size {
            let sizes = GraphSizeComputer::new(Arc::clone(&graph));
            collector = collector.with_graph_sizes(Arc::new(sizes));
        }
        let collector = Arc::new(collector);

        let mut jobs = Vec::new();
        for (target, providers) in &requests {
            for configuration in self.builder.configurations(target)? {
                let key = ConfiguredTargetKey::new(target.clone(), configuration);
                if !collector.expect(key.label.clone(), key.configuration.clone()) {
                    tracing::debug!(key = %key, "skipping repeated configuration");
                    continue;
                }
                self.builder.configure(&key, &graph)?;
                jobs.push((key, providers.iter().cloned().collect::<Vec<_>>()));
            }
        }
        tracing::debug!(
            jobs = jobs.len(),
            graph_nodes = graph.node_count(),
            "configured requested targets"
        );

        let mut tasks = JoinSet::new();
        for (key, providers) in jobs {
            tasks.spawn(build_one(
                Arc::clone(&self.builder),
                Arc::clone(&collector),
                self.cancel.subscribe(),
                key,
                providers,
            ));
        }
        self.drive(&mut tasks, &collector).await?;

        let snapshot = if self.best_effort {
            collector.finalize_best_effort(&requested).await?
        } else {
            collector.finalize(&requested).await?
        };

        let assembler = ReportAssembler::new(self.options.clone(), self.builder.cells().clone());
        let report = assembler.assemble(&snapshot)?;

        let written_to = match &self.options.destination {
            Some(dest) => {
                ReportWriter::write(&report, dest)?;
                Some(dest.clone())
            }
            None => None,
        };
        tracing::info!(success = report.success, truncated = report.truncated, "build finished");
        Ok(InvocationOutcome { report, written_to })
    }

    async fn drive(
        &self,
        tasks: &mut JoinSet<Result<(), ReportError>>,
        collector: &TargetResultCollector,
    ) -> Result<(), ReportError> {
        let cancelled = cancelled(self.cancel.subscribe());
        tokio::pin!(cancelled);
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        tracing::error!(error = %err, "aborting invocation");
                        tasks.abort_all();
                        return Err(err);
                    }
                    Some(Err(join_err)) => {
                        collector.fail(format!("build task failed: {join_err}"));
                        tasks.abort_all();
                        return Ok(());
                    }
                },
                () = &mut cancelled => {
                    collector.cancel();
                    tasks.abort_all();
                    return Ok(());
                }
            }
        }
    }
}

async fn build_one(
    builder: Arc<dyn TargetBuilder>,
    collector: Arc<TargetResultCollector>,
    cancel: watch::Receiver<bool>,
    key: ConfiguredTargetKey,
    providers: Vec<ProvidersName>,
) -> Result<(), ReportError> {
    let build = builder.build(&key, &providers);
    let cancelled = cancelled(cancel);
    futures::pin_mut!(cancelled);

    match future::select(build, cancelled).await {
        Either::Left((outcome, _)) => {
            collector.record(key.label.clone(), key.configuration.clone(), outcome)
        }
        Either::Right(((), _)) => {
            tracing::debug!(key = %key, "build dropped on cancellation");
            Ok(())
        }
    }
}

/// Resolves once cancellation is requested; never if the sender goes away
async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}

/// Group requested patterns by target, merging providers names
fn group_patterns(patterns: &[ProvidersLabel]) -> BTreeMap<TargetLabel, BTreeSet<ProvidersName>> {
    let mut requests: BTreeMap<TargetLabel, BTreeSet<ProvidersName>> = BTreeMap::new();
    for pattern in patterns {
        requests
            .entry(pattern.target.clone())
            .or_default()
            .insert(pattern.name.clone());
    }
    requests
}
