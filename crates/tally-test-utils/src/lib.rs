//! Testing utilities for the tally workspace
//!
//! Shared build plan fixtures and report helpers.

#![allow(missing_docs)]

use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// The e2e fixture project
///
/// - `//:rule1` depends on `//:dep1` (configured graph size 2)
/// - `//:rule2` depends on `//:mid`, which depends on `//:leaf` (size 3);
///   its `out1` sub-target names the same file as its default output
/// - `//subdir:rule` lives in a nested package
pub const FIXTURE_PLAN: &str = r#"{
  "root_cell": "root",
  "targets": {
    "//:rule1": {
      "deps": ["//:dep1"],
      "outputs": { "DEFAULT": ["out.txt"] }
    },
    "//:dep1": {
      "outputs": { "DEFAULT": ["dep1.txt"] }
    },
    "//:rule2": {
      "deps": ["//:mid"],
      "outputs": { "DEFAULT": ["out1.txt"], "out1": ["out1.txt"] }
    },
    "//:mid": { "deps": ["//:leaf"] },
    "//:leaf": {},
    "//subdir:rule": {
      "outputs": { "DEFAULT": ["out.txt"] }
    }
  }
}"#;

/// A fixture project that also has a failing and a slow target
pub const FAILING_PLAN: &str = r#"{
  "root_cell": "root",
  "targets": {
    "//:ok": { "outputs": { "DEFAULT": ["ok.txt"] } },
    "//:bad": { "fail": "error: expected `;`, found `}`" },
    "//:slow": { "outputs": { "DEFAULT": ["slow.txt"] }, "delay_ms": 60000 }
  }
}"#;

/// Write `plan` into `dir` and return its path
pub fn write_plan(dir: &Path, plan: &str) -> PathBuf {
    let path = dir.join("plan.json");
    std::fs::write(&path, plan).unwrap();
    path
}

/// A scratch project directory holding [`FIXTURE_PLAN`]
pub fn fixture_project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let plan = write_plan(dir.path(), FIXTURE_PLAN);
    (dir, plan)
}

fn hash_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("/[0-9a-f]{16}/").unwrap())
}

/// Mask content digest segments in an output path as `<HASH>`
pub fn replace_hashes(path: &str) -> String {
    hash_segment().replace_all(path, "/<HASH>/").into_owned()
}

/// [`replace_hashes`] over a JSON array of paths
pub fn replace_hashes_in(paths: &Value) -> Vec<String> {
    paths
        .as_array()
        .unwrap_or_else(|| panic!("expected an array of paths, got {paths}"))
        .iter()
        .map(|p| replace_hashes(p.as_str().unwrap()))
        .collect()
}

pub fn read_report(path: &Path) -> Value {
    let bytes = std::fs::read(path).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
