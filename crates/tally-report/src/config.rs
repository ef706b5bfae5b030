//! Layered `section.key` configuration
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file whose tables are sections, and `-c section.key=value` overrides.
//! Keys nobody reads are kept and ignored.

use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::path::Path;

/// Include the per-target unconfigured view in the report
pub const PRINT_UNCONFIGURED_SECTION: &str = "build_report.print_unconfigured_section";

/// Compute `configured_graph_size` for every reported configuration
pub const LOG_CONFIGURED_GRAPH_SIZE: &str = "buck2.log_configured_graph_size";

/// Flat `section.key -> value` configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportConfig {
    values: BTreeMap<String, String>,
}

impl ReportConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `section.key=value` into its key and value
    ///
    /// # Errors
    /// `InvalidOverride` when there is no `=`, or the key is not a non-empty
    /// section and name separated by a dot
    pub fn parse_override(raw: &str) -> Result<(String, String), ConfigError> {
        let invalid = || ConfigError::InvalidOverride(raw.to_string());
        let (key, value) = raw.split_once('=').ok_or_else(invalid)?;
        let key = key.trim();
        let (section, name) = key.split_once('.').ok_or_else(invalid)?;
        if section.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok((key.to_string(), value.trim().to_string()))
    }

    /// Apply one `-c` override on top of the current values
    ///
    /// # Errors
    /// See [`ReportConfig::parse_override`]
    pub fn apply_override(&mut self, raw: &str) -> Result<(), ConfigError> {
        let (key, value) = Self::parse_override(raw)?;
        tracing::debug!(%key, %value, "config override");
        self.values.insert(key, value);
        Ok(())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Parse a TOML document of `[section]` tables
    ///
    /// # Errors
    /// Parse errors, top-level values outside a table, and values that are
    /// not strings, integers or booleans
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = source.parse()?;
        let mut config = Self::new();
        for (section, entries) in table {
            let toml::Value::Table(entries) = entries else {
                return Err(ConfigError::UnsupportedValue(section));
            };
            for (name, value) in entries {
                let key = format!("{section}.{name}");
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Integer(i) => i.to_string(),
                    _ => return Err(ConfigError::UnsupportedValue(key)),
                };
                config.values.insert(key, value);
            }
        }
        Ok(config)
    }

    /// Read and parse a TOML config file
    ///
    /// # Errors
    /// I/O errors plus everything [`ReportConfig::from_toml_str`] rejects
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), keys = config.values.len(), "loaded config file");
        Ok(config)
    }

    /// Layer `other` over `self`; keys in `other` win
    pub fn merge(&mut self, other: ReportConfig) {
        self.values.extend(other.values);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Boolean value of `key`, or `default` when unset
    ///
    /// # Errors
    /// `InvalidBool` for anything other than true/false/1/0/yes/no/on/off
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }
}
