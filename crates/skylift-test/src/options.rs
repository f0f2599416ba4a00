//! Options for a test run.

use std::path::PathBuf;

use skylift_core::Target;

use crate::snapshot::SnapshotMode;

#[derive(Debug, Clone)]
pub struct TestOptions {
    pub target: Target,
    /// Root id of the application tree. Defaults to `root` on the simulator
    /// and a random `Test.<id>` elsewhere.
    pub root_id: Option<String>,
    /// Remove compiled output after the run.
    pub clean: bool,
    pub output_file: Option<PathBuf>,
    /// Regex over test names.
    pub test_filter: Option<String>,
    /// Attempts per file, including the first. `0` behaves like `1`.
    pub retry: u32,
    /// Print traces live instead of in the per-file report.
    pub stream: bool,
    pub snapshots: SnapshotMode,
    /// Files in flight at once. `0` means unbounded.
    pub parallel: usize,
    /// Show verbose traces.
    pub debug: bool,
    /// Restart the simulator around every test instead of once per file.
    pub isolate_tests: bool,
    /// Running under CI; `auto` snapshots assert instead of update.
    pub ci: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            target: Target::Sim,
            root_id: None,
            clean: true,
            output_file: None,
            test_filter: None,
            retry: 1,
            stream: false,
            snapshots: SnapshotMode::Auto,
            parallel: 0,
            debug: false,
            isolate_tests: false,
            ci: false,
        }
    }
}

impl TestOptions {
    pub fn attempts(&self) -> u32 {
        self.retry.max(1)
    }
}
