//! SkyLift Test - test orchestration for lifted applications
//!
//! Finds test files, compiles each for a target and runs its tests:
//! - Bounded file-level parallelism with per-file isolation
//! - Whole-file retry of failing files
//! - Ordered trace streaming and per-file reports
//! - Snapshot capture and assertion of synthesized artifacts
//! - JSON results documents

pub mod compile;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod harness;
pub mod options;
pub mod orchestrator;
pub mod report;
pub mod results;
pub mod snapshot;
pub mod trace_processor;

// Re-export key types
pub use compile::{CompiledApp, Compiler, ManifestCompiler, TEMPLATE_FILE};
pub use discovery::{FsDiscovery, StaticDiscovery, TestFileDiscovery, TEST_FILE_SUFFIX};
pub use error::{Result, TestError};
pub use filter::TestFilter;
pub use harness::{DeployedRunner, TestHarness};
pub use options::TestOptions;
pub use orchestrator::{exit_code, FileState, NoopObserver, Orchestrator, RunObserver, RunReport};
pub use report::{MemorySink, ReportSink, StdoutSink, TraceFormat};
pub use results::{results_document, write_results_to_file, FileResults};
pub use snapshot::{FsSnapshotStore, SnapshotDecision, SnapshotMode, SnapshotStore};
pub use trace_processor::{TraceHandler, TraceProcessor, TraceQueue};
