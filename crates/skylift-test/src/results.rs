//! Per-file results and the optional JSON results artifact.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use skylift_core::{test_name_from_path, Target, TestResult, TraceEvent};

use crate::error::{Result, TestError};
use crate::snapshot::SnapshotDecision;

/// Final results of one test file: the last attempt's results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResults {
    pub file: PathBuf,
    /// Name the file is reported under.
    pub name: String,
    pub results: Vec<TestResult>,
    pub snapshot: SnapshotDecision,
    pub attempts: u32,
}

impl FileResults {
    pub fn has_failure(&self) -> bool {
        self.results.iter().any(TestResult::is_failure)
    }
}

/// Only `.json` destinations are supported.
pub fn validate_output_file_path(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    if ext != ".json" {
        return Err(TestError::UnsupportedOutputFormat { found: ext });
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TraceRecord<'a> {
    message: &'a str,
    status: &'static str,
    source_path: &'a str,
    source_type: &'a str,
}

impl<'a> From<&'a TraceEvent> for TraceRecord<'a> {
    fn from(trace: &'a TraceEvent) -> Self {
        Self {
            message: &trace.data.message,
            status: if trace.data.error.is_some() {
                "failure"
            } else {
                "success"
            },
            source_path: &trace.source_path,
            source_type: &trace.source_type,
        }
    }
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    path: &'a str,
    pass: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    traces: Vec<TraceRecord<'a>>,
}

/// Build the results document:
/// `{duration_ms, target, results: {file: {test: {path, pass, error, traces}}}}`.
pub fn results_document(files: &[FileResults], duration_ms: u64, target: Target) -> Result<Value> {
    let mut by_file = Map::new();
    for file in files {
        let mut by_test = Map::new();
        for result in &file.results {
            let short = test_name_from_path(&result.path).unwrap_or(&result.path);
            let record = ResultRecord {
                path: &result.path,
                pass: result.pass,
                error: result.error.as_deref(),
                traces: result.traces.iter().map(TraceRecord::from).collect(),
            };
            by_test.insert(short.to_string(), serde_json::to_value(record)?);
        }
        by_file.insert(file.name.clone(), Value::Object(by_test));
    }
    Ok(serde_json::json!({
        "duration_ms": duration_ms,
        "target": target.name(),
        "results": by_file,
    }))
}

pub fn write_results_to_file(
    files: &[FileResults],
    duration_ms: u64,
    target: Target,
    path: &Path,
) -> Result<()> {
    validate_output_file_path(path)?;
    let document = results_document(files, duration_ms, target)?;
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, json).map_err(|e| TestError::io(path, e))?;
    tracing::info!(path = %path.display(), files = files.len(), "wrote test results");
    Ok(())
}
