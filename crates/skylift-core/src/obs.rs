//! Structured lifecycle events for test runs.
//!
//! Every run-level milestone goes through one of the `emit_*` functions so
//! log consumers can key on a stable `event` field.

use tracing::{info, warn};

/// Span scoped to one test file. Attach to futures with `Instrument`.
pub fn file_span(file: &str, target: &str) -> tracing::Span {
    tracing::info_span!("skylift.file", file = %file, target = %target)
}

pub fn emit_run_started(target: &str, files: usize, parallel: usize, retries: u32) {
    info!(
        event = "run.started",
        target = %target,
        files = files,
        parallel = parallel,
        retries = retries,
    );
}

pub fn emit_run_finished(target: &str, duration_ms: u64, total: usize, failed: usize) {
    info!(
        event = "run.finished",
        target = %target,
        duration_ms = duration_ms,
        total = total,
        failed = failed,
    );
}

pub fn emit_file_compiled(file: &str, out_dir: &str) {
    info!(event = "file.compiled", file = %file, out_dir = %out_dir);
}

pub fn emit_file_finished(file: &str, passed: usize, failed: usize, attempts: u32) {
    info!(
        event = "file.finished",
        file = %file,
        passed = passed,
        failed = failed,
        attempts = attempts,
    );
}

/// Emit event: an attempt failed and the file will run again.
pub fn emit_retry(file: &str, retries_left: u32) {
    warn!(event = "file.retry", file = %file, retries_left = retries_left);
}

/// Emit event: an attempt aborted before producing per-test results.
pub fn emit_file_error(file: &str, error: &dyn std::fmt::Display) {
    warn!(event = "file.error", file = %file, error = %error);
}

pub fn emit_resource_started(path: &str, kind: &str) {
    tracing::debug!(event = "resource.started", path = %path, kind = %kind);
}

pub fn emit_resource_stopped(path: &str, kind: &str) {
    tracing::debug!(event = "resource.stopped", path = %path, kind = %kind);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_inside_file_span() {
        let _span = file_span("hello.test.json", "sim").entered();
        emit_file_compiled("hello.test.json", "target/hello.sim.abc");
        emit_retry("hello.test.json", 2);
    }
}
