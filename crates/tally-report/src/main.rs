//! `tally` command-line driver

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tally_artifact::ProvidersLabel;
use tally_report::{BuildInvocation, PlanBuilder, ReportConfig, ReportOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Multi-target build driver with build reports")]
struct Cli {
    /// Diagnostic log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build targets from a plan and optionally write a build report
    Build(BuildArgs),
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Target patterns, e.g. `//:rule1` or `//:rule2[out1]`
    #[arg(required = true)]
    patterns: Vec<String>,

    /// JSON build plan describing the project
    #[arg(long)]
    plan: PathBuf,

    /// Write the build report to this file
    #[arg(long, value_name = "FILE")]
    build_report: Option<PathBuf>,

    /// Extra report options, e.g. package-project-relative-paths
    #[arg(long, value_delimiter = ',', value_name = "OPTION")]
    build_report_options: Vec<String>,

    /// Config override
    #[arg(short = 'c', long = "config", value_name = "SECTION.KEY=VALUE")]
    config: Vec<String>,

    /// TOML config file, applied before -c overrides
    #[arg(long, value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Project root recorded in the report
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Still write a (truncated) report if the build is cancelled
    #[arg(long)]
    best_effort_report: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("TALLY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(args: &BuildArgs) -> anyhow::Result<ReportConfig> {
    let mut config = ReportConfig::new();
    if let Some(path) = &args.config_file {
        let file = ReportConfig::load_file(path)
            .with_context(|| format!("loading config file {}", path.display()))?;
        config.merge(file);
    }
    for raw in &args.config {
        config
            .apply_override(raw)
            .with_context(|| format!("applying -c {raw}"))?;
    }
    Ok(config)
}

async fn build(args: BuildArgs) -> anyhow::Result<bool> {
    let plan = PlanBuilder::load(&args.plan)
        .with_context(|| format!("loading build plan {}", args.plan.display()))?;
    let root = plan.root_cell().clone();
    let patterns = args
        .patterns
        .iter()
        .map(|p| ProvidersLabel::parse(p, &root).with_context(|| format!("invalid pattern `{p}`")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let config = load_config(&args)?;
    let project_root = match &args.project_root {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("resolving project root")?,
    };
    let options = ReportOptions::from_config(
        &config,
        args.build_report_options.as_slice(),
        args.build_report.clone(),
    )
    .context("resolving build report options")?
    .with_project_root(project_root.display().to_string());

    let invocation =
        BuildInvocation::new(Arc::new(plan), options).with_best_effort(args.best_effort_report);
    let canceller = invocation.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let outcome = invocation.run(&patterns).await.context("build failed")?;
    for (target, reason) in &outcome.report.failures {
        tracing::error!(%target, %reason, "target failed");
    }
    Ok(outcome.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Command::Build(args) => build(args).await,
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}
