//! Atomic report persistence

use crate::error::ReportError;
use crate::report::BuildReport;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a [`BuildReport`] to disk exactly once per invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportWriter;

impl ReportWriter {
    /// Canonical JSON bytes of a report: pretty-printed, newline-terminated
    ///
    /// # Errors
    /// Serialization errors
    pub fn to_canonical_json(report: &BuildReport) -> Result<Vec<u8>, ReportError> {
        let mut bytes = serde_json::to_vec_pretty(report)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Persist `report` at `destination`
    ///
    /// The document is written to a temporary file in the destination's
    /// directory and renamed into place, so a failed write never leaves a
    /// partial report behind. The temporary file is removed on every error
    /// path when it is dropped.
    ///
    /// # Errors
    /// Serialization and I/O errors
    pub fn write(report: &BuildReport, destination: &Path) -> Result<(), ReportError> {
        let bytes = Self::to_canonical_json(report)?;
        let io_err = |source| ReportError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let dir = parent_dir(destination);
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(destination).map_err(|e| io_err(e.error))?;

        tracing::info!(
            path = %destination.display(),
            bytes = bytes.len(),
            success = report.success,
            "wrote build report"
        );
        Ok(())
    }
}

fn parent_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
