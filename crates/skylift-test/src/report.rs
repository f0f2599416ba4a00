//! Console rendering of test results and live traces.

use std::path::Path;
use std::sync::{Arc, Mutex};

use skylift_core::{LogLevel, TestResult, TraceEvent};

use crate::results::FileResults;
use crate::snapshot::SnapshotDecision;

// ── sinks ─────────────────────────────────────────────────────────────────

/// Destination for human-readable output.
pub trait ReportSink: Send + Sync {
    fn write_line(&self, text: &str);
}

/// Writes to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn write_line(&self, text: &str) {
        println!("{text}");
    }
}

/// Collects output in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

impl ReportSink for MemorySink {
    fn write_line(&self, text: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.extend(text.lines().map(str::to_string));
    }
}

// ── ordering & visibility ─────────────────────────────────────────────────

/// Failing results first, then by path.
pub fn sort_results(results: &mut [TestResult]) {
    results.sort_by(|a, b| a.pass.cmp(&b.pass).then_with(|| a.path.cmp(&b.path)));
}

/// Verbose traces are only shown in debug mode.
pub fn should_skip_trace(trace: &TraceEvent, debug: bool) -> bool {
    trace.level == LogLevel::Verbose && !debug
}

/// Layout of a streamed trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// `[LEVEL] test | message`
    Short,
    /// Timestamp and source path on one line, message on the next.
    Full,
}

impl TraceFormat {
    pub fn for_debug(debug: bool) -> Self {
        if debug {
            TraceFormat::Full
        } else {
            TraceFormat::Short
        }
    }
}

fn trace_body(trace: &TraceEvent) -> &str {
    if trace.level == LogLevel::Error {
        trace.data.error.as_deref().unwrap_or(&trace.data.message)
    } else {
        &trace.data.message
    }
}

pub fn format_trace(trace: &TraceEvent, test_name: &str, format: TraceFormat) -> String {
    let tag = trace.level.tag();
    match format {
        TraceFormat::Short => format!("{tag} {test_name} | {}", trace_body(trace)),
        TraceFormat::Full => format!(
            "[{}] {tag} {test_name} » {}\n{}\n",
            trace.timestamp.format("%H:%M:%S%.3f"),
            trace.source_path,
            trace_body(trace)
        ),
    }
}

// ── per-file report ───────────────────────────────────────────────────────

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

/// Render the results of one file.
///
/// A file without tests renders as a single pass line so that a file which
/// only compiles still shows up.
pub fn render_test_report(
    file: &Path,
    results: &[TestResult],
    include_logs: bool,
    debug: bool,
) -> String {
    let name = display_name(file);
    if results.is_empty() {
        return format!("pass ─ {name} (no tests)");
    }

    let mut sorted = results.to_vec();
    sort_results(&mut sorted);
    let width = sorted.iter().map(|r| r.path.len()).max().unwrap_or(0);

    let mut out = Vec::new();
    for result in &sorted {
        let status = if result.pass { "pass" } else { "fail" };

        let mut details: Vec<&str> = Vec::new();
        if include_logs {
            details.extend(
                result
                    .traces
                    .iter()
                    .filter(|t| !should_skip_trace(t, debug))
                    .map(|t| t.data.message.as_str()),
            );
        }
        if let Some(error) = &result.error {
            details.extend(error.lines());
        }

        let corner = if details.is_empty() { "─" } else { "┌" };
        out.push(format!(
            "{status} {corner} {name} » {:<width$}",
            result.path,
            width = width
        ));
        let last = details.len().saturating_sub(1);
        for (i, line) in details.iter().enumerate() {
            let left = if i == last { "└" } else { "│" };
            out.push(format!("     {left} {line}"));
        }
    }
    out.join("\n")
}

// ── run summary ───────────────────────────────────────────────────────────

pub fn render_summary(files: &[FileResults], duration_ms: u64) -> String {
    let all = files.iter().flat_map(|f| f.results.iter());
    let (mut passed, mut failed, mut unsupported) = (0usize, 0usize, 0usize);
    for r in all {
        if r.pass {
            passed += 1;
        } else if r.unsupported {
            unsupported += 1;
        } else {
            failed += 1;
        }
    }
    let failed_files = files.iter().filter(|f| f.has_failure()).count();

    let mut out = vec![
        format!(
            "Test Files {} passed, {} failed ({})",
            files.len() - failed_files,
            failed_files,
            files.len()
        ),
        format!("     Tests {passed} passed, {failed} failed, {unsupported} unsupported"),
    ];

    let mismatched: Vec<&str> = files
        .iter()
        .filter(|f| f.snapshot == SnapshotDecision::Mismatch)
        .map(|f| f.name.as_str())
        .collect();
    if !mismatched.is_empty() {
        out.push(format!(" Snapshots mismatch in {}", mismatched.join(", ")));
    }
    out.push(format!("  Duration {:.2}s", duration_ms as f64 / 1000.0));
    out.join("\n")
}
