//! Per-invocation report options

use crate::config::{ReportConfig, LOG_CONFIGURED_GRAPH_SIZE, PRINT_UNCONFIGURED_SECTION};
use crate::error::ConfigError;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// A value accepted by `--build-report-options`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportOption {
    /// Attach `package_project_relative_path` to each target entry
    PackageProjectRelativePaths,
    /// Attach an `errors` list to failing configured entries
    FillOutFailures,
}

impl ReportOption {
    pub const ALL: [ReportOption; 2] = [Self::PackageProjectRelativePaths, Self::FillOutFailures];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageProjectRelativePaths => "package-project-relative-paths",
            Self::FillOutFailures => "fill-out-failures",
        }
    }
}

impl Display for ReportOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportOption {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownReportOption(s.to_string()))
    }
}

/// Immutable options, resolved once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_unconfigured_section: bool,
    pub include_package_relative_paths: bool,
    pub fill_out_failures: bool,
    pub log_configured_graph_size: bool,
    /// Where the report is written; `None` skips writing
    pub destination: Option<PathBuf>,
    pub trace_id: String,
    pub project_root: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_unconfigured_section: true,
            include_package_relative_paths: false,
            fill_out_failures: false,
            log_configured_graph_size: false,
            destination: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
            project_root: String::new(),
        }
    }
}

impl ReportOptions {
    /// Resolve options from config plus raw `--build-report-options` values
    ///
    /// Each raw value may itself be a comma-separated list.
    ///
    /// # Errors
    /// Malformed booleans in `config` and unknown report options
    pub fn from_config<S: AsRef<str>>(
        config: &ReportConfig,
        report_options: &[S],
        destination: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let mut options = Self {
            include_unconfigured_section: config.get_bool(PRINT_UNCONFIGURED_SECTION, true)?,
            log_configured_graph_size: config.get_bool(LOG_CONFIGURED_GRAPH_SIZE, false)?,
            destination,
            ..Self::default()
        };

        let requested = report_options
            .iter()
            .flat_map(|raw| raw.as_ref().split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        for raw in requested {
            match raw.parse::<ReportOption>()? {
                ReportOption::PackageProjectRelativePaths => {
                    options.include_package_relative_paths = true;
                }
                ReportOption::FillOutFailures => options.fill_out_failures = true,
            }
        }

        tracing::debug!(?options, "resolved report options");
        Ok(options)
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    #[must_use]
    pub fn with_project_root(mut self, project_root: impl Into<String>) -> Self {
        self.project_root = project_root.into();
        self
    }
}
