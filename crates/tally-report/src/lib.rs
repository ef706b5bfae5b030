//! Tally Report - build report aggregation
//!
//! Collects per-target, per-configuration build outcomes as they complete and
//! turns them into one deterministic JSON report:
//! - Concurrent, exactly-once result collection with a blocking join point
//! - Optional configured graph sizes, memoized across shared subgraphs
//! - Option-controlled report views (unconfigured section, package paths)
//! - Atomic report persistence
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_artifact::ProvidersLabel;
//! use tally_report::{BuildInvocation, PlanBuilder, ReportConfig, ReportOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = PlanBuilder::load("plan.json".as_ref())?;
//! let root = plan.root_cell().clone();
//! let options = ReportOptions::from_config(
//!     &ReportConfig::new(),
//!     &["package-project-relative-paths"],
//!     Some("report".into()),
//! )?;
//!
//! let invocation = BuildInvocation::new(Arc::new(plan), options);
//! let outcome = invocation.run(&[ProvidersLabel::parse("//:rule1", &root)?]).await?;
//! println!("success: {}", outcome.report.success);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod assembler;
pub mod collector;
pub mod config;
pub mod error;
pub mod invocation;
pub mod options;
pub mod plan;
pub mod report;
pub mod result;
pub mod writer;

pub use assembler::ReportAssembler;
pub use collector::{ResultSnapshot, TargetResultCollector, TargetResults, CANCELLED_REASON};
pub use config::{ReportConfig, LOG_CONFIGURED_GRAPH_SIZE, PRINT_UNCONFIGURED_SECTION};
pub use error::{ConfigError, PlanError, ReportError};
pub use invocation::{BuildInvocation, Canceller, InvocationOutcome, TargetBuilder};
pub use options::{ReportOption, ReportOptions};
pub use plan::PlanBuilder;
pub use report::{BuildReport, ConfiguredReportEntry, TargetReportEntry};
pub use result::{BuildFailure, BuildOutcome, ConfiguredResult, OutputGroups, TargetOutputs};
pub use writer::ReportWriter;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;
    use tally_artifact::{CellName, ProvidersLabel};

    const PLAN: &str = r#"{
        "targets": {
            "//:top": { "deps": ["//:mid"], "outputs": { "DEFAULT": ["top.out"] } },
            "//:mid": { "deps": ["//:leaf"] },
            "//:leaf": {},
            "//:broken": { "fail": "compiler exploded" }
        }
    }"#;

    fn patterns(raw: &[&str]) -> Vec<ProvidersLabel> {
        let root = CellName::new("root").unwrap();
        raw.iter().map(|p| ProvidersLabel::parse(p, &root).unwrap()).collect()
    }

    #[tokio::test]
    async fn failing_target_is_data_not_error() {
        let mut config = ReportConfig::new();
        config.apply_override("buck2.log_configured_graph_size=on").unwrap();
        let options = ReportOptions::from_config::<&str>(&config, &[], None).unwrap();

        let plan = PlanBuilder::from_json(PLAN).unwrap();
        let invocation = BuildInvocation::new(Arc::new(plan), options);
        let outcome = invocation.run(&patterns(&["//:top", "//:broken"])).await.unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.written_to.is_none());
        let report = &outcome.report;
        assert_eq!(report.failures.len(), 1);
        let top = &report.results[&tally_artifact::TargetLabel::parse("root//:top").unwrap()];
        assert_eq!(top.unconfigured.as_ref().unwrap().configured_graph_size, Some(3));
        assert_eq!(top.unconfigured.as_ref().unwrap().success, BuildOutcome::Success);
    }

    #[tokio::test]
    async fn cyclic_plan_is_fatal_when_sizing() {
        let plan = r#"{
            "targets": { "//:a": { "deps": ["//:b"] }, "//:b": { "deps": ["//:a"] } }
        }"#;
        let mut config = ReportConfig::new();
        config.apply_override("buck2.log_configured_graph_size=true").unwrap();
        let options = ReportOptions::from_config::<&str>(&config, &[], None).unwrap();

        let plan = PlanBuilder::from_json(plan).unwrap();
        let invocation = BuildInvocation::new(Arc::new(plan), options);
        let err = invocation.run(&patterns(&["//:a"])).await.unwrap_err();
        assert!(err.is_structural(), "{err}");
    }
}
