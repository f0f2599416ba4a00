//! End-to-end orchestration: scheduling, retry, isolation, streaming,
//! snapshots and the results document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use skylift_core::{Target, TestResult, TraceEvent, TraceType};
use skylift_sim::{Handlers, InflightContext, InflightError};
use skylift_test::{
    DeployedRunner, FileState, FsSnapshotStore, ManifestCompiler, MemorySink, Orchestrator,
    RunObserver, SnapshotDecision, SnapshotMode, StaticDiscovery, TestError, TestHarness,
    TestOptions,
};

// ── fixtures ──────────────────────────────────────────────────────────────

const COUNTER_APP: &str = r#"{
    "resources": [{ "id": "Counter", "kind": "counter", "initial": 0 }],
    "tests": [
        {
            "name": "increments",
            "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc", "peek"] }],
            "steps": [
                { "do": "log", "message": "about to inc" },
                { "do": "call", "binding": "c", "method": "inc" },
                { "do": "call", "binding": "c", "method": "peek", "expect": 1 }
            ]
        },
        {
            "name": "increments again",
            "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc", "peek"] }],
            "steps": [
                { "do": "call", "binding": "c", "method": "inc" },
                { "do": "call", "binding": "c", "method": "peek", "expect": 1 }
            ]
        }
    ]
}"#;

const FAILING_APP: &str = r#"{
    "tests": [{ "name": "always fails", "steps": [{ "do": "fail", "message": "boom" }] }]
}"#;

fn sleeping_app(ms: u64, message: &str) -> String {
    format!(
        r#"{{
            "tests": [{{
                "name": "sleeps",
                "steps": [
                    {{ "do": "sleep", "ms": {ms} }},
                    {{ "do": "log", "message": "{message}" }}
                ]
            }}]
        }}"#
    )
}

struct Fixture {
    dir: TempDir,
    sink: MemorySink,
    observer: Arc<Recorder>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            sink: MemorySink::new(),
            observer: Arc::new(Recorder::default()),
        }
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn out_root(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn orchestrator(&self, files: Vec<PathBuf>) -> Orchestrator {
        self.orchestrator_with(files, Handlers::new())
    }

    fn orchestrator_with(&self, files: Vec<PathBuf>, handlers: Handlers) -> Orchestrator {
        Orchestrator::new(
            StaticDiscovery::new(files),
            ManifestCompiler::new().with_out_root(self.out_root()),
        )
        .with_handlers(handlers)
        .with_sink(Arc::new(self.sink.clone()))
        .with_observer(self.observer.clone())
    }

    fn has_line(&self, needle: &str) -> bool {
        self.sink.lines().iter().any(|l| l.contains(needle))
    }
}

/// Tracks files in flight and every log trace.
#[derive(Default)]
struct Recorder {
    executing: Mutex<HashSet<PathBuf>>,
    max_executing: AtomicUsize,
    logs: Mutex<Vec<String>>,
    states: Mutex<Vec<(PathBuf, FileState)>>,
}

impl Recorder {
    fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    fn states_of(&self, file: &Path) -> Vec<FileState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f == file)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl RunObserver for Recorder {
    fn on_state(&self, file: &Path, state: FileState) {
        self.states.lock().unwrap().push((file.to_path_buf(), state));
        let mut executing = self.executing.lock().unwrap();
        match state {
            FileState::Executing => {
                executing.insert(file.to_path_buf());
                self.max_executing.fetch_max(executing.len(), Ordering::SeqCst);
            }
            FileState::Passed | FileState::Failed => {
                executing.remove(file);
            }
            _ => {}
        }
    }

    fn on_trace(&self, _file: &Path, trace: &TraceEvent) {
        if trace.trace_type == TraceType::Log {
            self.logs.lock().unwrap().push(trace.data.message.clone());
        }
    }
}

fn sim_options() -> TestOptions {
    TestOptions {
        target: Target::Sim,
        ..TestOptions::default()
    }
}

// ── basic runs ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_passing_file_reports_and_cleans_up() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        test_filter: Some("^increments$".into()),
        ..sim_options()
    };

    let report = fx
        .orchestrator(vec![file.clone()])
        .run_report(&[], &options)
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].attempts, 1);
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Never);
    assert!(fx.has_line("pass ┌ counter.test.json » root/env0/test:increments"));
    assert!(fx.has_line("about to inc"));
    assert!(fx.has_line("Test Files 1 passed, 0 failed (1)"));

    let leftovers = std::fs::read_dir(fx.out_root()).unwrap().count();
    assert_eq!(leftovers, 0);
    assert_eq!(
        fx.observer.states_of(&file),
        vec![
            FileState::Pending,
            FileState::Compiling,
            FileState::Executing,
            FileState::Passed,
            FileState::Reported,
        ]
    );
}

#[tokio::test]
async fn test_file_without_tests_passes() {
    let fx = Fixture::new();
    let file = fx.write("empty.test.json", r#"{ "resources": [{ "id": "Counter", "kind": "counter" }] }"#);

    let code = fx.orchestrator(vec![file]).run(&[], &sim_options()).await.unwrap();
    assert_eq!(code, 0);
    assert!(fx.has_line("pass ─ empty.test.json (no tests)"));
}

#[tokio::test]
async fn test_filter_selects_by_test_name() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        test_filter: Some("again".into()),
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    let paths: Vec<_> = report.files[0].results.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["root/env1/test:increments again"]);
}

#[tokio::test]
async fn test_cleanup_disabled_keeps_output() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        clean: false,
        test_filter: Some("^increments$".into()),
        ..sim_options()
    };

    fx.orchestrator(vec![file]).run(&[], &options).await.unwrap();
    assert!(fx.has_line("Cleanup is disabled!"));
    assert_eq!(std::fs::read_dir(fx.out_root()).unwrap().count(), 1);
}

// ── isolation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tests_share_state_within_a_file() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);

    let report = fx.orchestrator(vec![file]).run_report(&[], &sim_options()).await.unwrap();
    assert_eq!(report.exit_code, 1);
    let again = report.files[0]
        .results
        .iter()
        .find(|r| r.path.ends_with("increments again"))
        .unwrap();
    assert!(!again.pass);
    assert!(again.error.as_deref().unwrap().contains("expected 1, got 2"));
}

#[tokio::test]
async fn test_isolated_tests_start_from_fresh_state() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        isolate_tests: true,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    assert_eq!(report.exit_code, 0);
    assert!(report.files[0].results.iter().all(|r| r.pass));
}

#[tokio::test]
async fn test_teardown_failure_does_not_fail_the_file() {
    let fx = Fixture::new();
    let file = fx.write(
        "teardown.test.json",
        r#"{
            "resources": [{ "id": "Counter", "kind": "counter", "cleanup_error": "disk gone" }],
            "tests": [{
                "name": "increments",
                "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc"] }],
                "steps": [{ "do": "call", "binding": "c", "method": "inc" }]
            }]
        }"#,
    );
    let options = TestOptions {
        retry: 2,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.files[0].attempts, 1);
    assert!(report.files[0].results[0].pass);
}

// ── retry ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_file_is_retried_until_attempts_run_out() {
    let fx = Fixture::new();
    let file = fx.write("fails.test.json", FAILING_APP);
    let options = TestOptions {
        retry: 3,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    assert_eq!(report.exit_code, 1);
    assert_eq!(report.files[0].attempts, 3);
    assert_eq!(report.files[0].results.len(), 1);
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Skipped);

    let retries: Vec<_> = fx
        .sink
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("Retrying failed tests."))
        .collect();
    assert_eq!(
        retries,
        vec![
            "Retrying failed tests. 2 retries left.".to_string(),
            "Retrying failed tests. 1 retries left.".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_flaky_file_passes_on_retry() {
    let fx = Fixture::new();
    let file = fx.write(
        "flaky.test.json",
        r#"{ "tests": [{ "name": "flaky", "handler": "flaky" }] }"#,
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut handlers = Handlers::new();
    handlers.register("flaky", move |_ctx: InflightContext, _input: Value| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(InflightError::failed("first attempt fails"))
            } else {
                Ok(Value::Null)
            }
        }
    });

    let options = TestOptions {
        retry: 3,
        ..sim_options()
    };
    let report = fx
        .orchestrator_with(vec![file], handlers)
        .run_report(&[], &options)
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.files[0].attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(fx.has_line("Retrying failed tests. 2 retries left."));
    assert!(!fx.has_line("1 retries left"));
}

#[tokio::test]
async fn test_unsupported_result_is_retried() {
    let fx = Fixture::new();
    let file = fx.write(
        "unsupported.test.json",
        r#"{
            "tests": [{
                "name": "signs urls",
                "steps": [{ "do": "unsupported", "resource": "cloud.Bucket", "operation": "signed_url" }]
            }]
        }"#,
    );
    let options = TestOptions {
        retry: 2,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    // Unsupported results trigger a retry but never fail the run.
    assert_eq!(report.exit_code, 0);
    let file = &report.files[0];
    assert_eq!(file.attempts, 2);
    assert_eq!(file.results.len(), 1);
    assert!(file.results[0].unsupported);
    assert!(fx.has_line("Retrying failed tests. 1 retries left."));
}

#[tokio::test]
async fn test_attempt_error_becomes_synthetic_failure() {
    let fx = Fixture::new();
    let file = fx.write(
        "missing.test.json",
        r#"{ "tests": [{ "name": "t", "handler": "nowhere" }] }"#,
    );
    let options = TestOptions {
        retry: 2,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    assert_eq!(report.exit_code, 1);
    let file = &report.files[0];
    assert_eq!(file.attempts, 2);
    assert_eq!(file.results.len(), 1);
    assert_eq!(file.results[0].path, "*");
    assert!(file.results[0].error.as_deref().unwrap().contains("nowhere"));
    assert_eq!(file.snapshot, SnapshotDecision::Skipped);
}

#[tokio::test]
async fn test_construction_error_aborts_the_run() {
    let fx = Fixture::new();
    let good = fx.write("good.test.json", FAILING_APP);
    let bad = fx.write(
        "bad.test.json",
        r#"{ "tests": [{ "name": "t", "lifts": [{ "alias": "m", "resource": "Missing", "ops": ["get"] }] }] }"#,
    );
    let options = TestOptions {
        retry: 3,
        ..sim_options()
    };

    let err = fx
        .orchestrator(vec![good, bad])
        .run(&[], &options)
        .await
        .unwrap_err();
    assert!(err.is_construction(), "{err}");
    assert!(err.to_string().contains("unknown resource Missing"));
}

// ── scheduling ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_parallel_bounds_files_in_flight() {
    let fx = Fixture::new();
    let files: Vec<_> = (0..4)
        .map(|i| fx.write(&format!("f{i}.test.json"), &sleeping_app(10, "done")))
        .collect();
    let options = TestOptions {
        parallel: 2,
        ..sim_options()
    };

    let report = fx.orchestrator(files).run_report(&[], &options).await.unwrap();
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.files.len(), 4);
    assert_eq!(fx.observer.max_executing.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_parallel_runs_every_file_at_once() {
    let fx = Fixture::new();
    let files: Vec<_> = (0..4)
        .map(|i| fx.write(&format!("f{i}.test.json"), &sleeping_app(10, "done")))
        .collect();

    fx.orchestrator(files).run(&[], &sim_options()).await.unwrap();
    assert_eq!(fx.observer.max_executing.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_runs_files_in_order() {
    let fx = Fixture::new();
    let a = fx.write("a.test.json", &sleeping_app(50, "A-ends"));
    let b = fx.write("b.test.json", &sleeping_app(0, "B-ends"));
    let options = TestOptions {
        parallel: 1,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![a, b]).run_report(&[], &options).await.unwrap();
    assert_eq!(fx.observer.logs(), vec!["A-ends", "B-ends"]);
    let names: Vec<_> = report
        .files
        .iter()
        .map(|f| f.file.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.test.json", "b.test.json"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_keeps_discovery_order_across_worker_threads() {
    for _ in 0..10 {
        let fx = Fixture::new();
        let a = fx.write("a.test.json", &sleeping_app(20, "A-ends"));
        let b = fx.write("b.test.json", &sleeping_app(0, "B-ends"));
        let options = TestOptions {
            parallel: 1,
            ..sim_options()
        };

        fx.orchestrator(vec![a, b]).run(&[], &options).await.unwrap();
        assert_eq!(fx.observer.logs(), vec!["A-ends", "B-ends"]);
        assert_eq!(fx.observer.max_executing.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_slots_let_the_fast_file_finish_first() {
    let fx = Fixture::new();
    let a = fx.write("a.test.json", &sleeping_app(50, "A-ends"));
    let b = fx.write("b.test.json", &sleeping_app(0, "B-ends"));
    let options = TestOptions {
        parallel: 2,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![a, b]).run_report(&[], &options).await.unwrap();
    assert_eq!(fx.observer.logs(), vec!["B-ends", "A-ends"]);
    // Reported in discovery order regardless of completion order.
    assert!(report.files[0].file.ends_with("a.test.json"));
}

// ── streaming ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_prints_traces_live() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        stream: true,
        test_filter: Some("^increments$".into()),
        ..sim_options()
    };

    fx.orchestrator(vec![file]).run(&[], &options).await.unwrap();
    let lines = fx.sink.lines();
    let live = lines
        .iter()
        .position(|l| l == "[INFO] increments | about to inc")
        .unwrap();
    let report = lines
        .iter()
        .position(|l| l.starts_with("pass ─ counter.test.json"))
        .unwrap();
    assert!(live < report);
    // Logs were already streamed, so the report line has no detail block.
    assert!(!lines.iter().any(|l| l.trim_start().starts_with("└ about to inc")));
}

// ── output ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_results_document_is_written() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let out = fx.dir.path().join("results.json");
    let options = TestOptions {
        output_file: Some(out.clone()),
        isolate_tests: true,
        ..sim_options()
    };

    let report = fx.orchestrator(vec![file]).run_report(&[], &options).await.unwrap();
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(doc["target"], "sim");
    let by_test = &doc["results"][&report.files[0].name];
    assert_eq!(by_test["increments"]["pass"], true);
    assert_eq!(by_test["increments"]["path"], "root/env0/test:increments");
    assert_eq!(by_test["increments again"]["pass"], true);
}

#[tokio::test]
async fn test_output_file_must_be_json() {
    let fx = Fixture::new();
    let file = fx.write("counter.test.json", COUNTER_APP);
    let options = TestOptions {
        output_file: Some(fx.dir.path().join("results.csv")),
        ..sim_options()
    };

    let err = fx.orchestrator(vec![file]).run(&[], &options).await.unwrap_err();
    assert!(matches!(err, TestError::UnsupportedOutputFormat { .. }));
}

#[tokio::test]
async fn test_no_files_is_an_error() {
    let fx = Fixture::new();
    let err = fx
        .orchestrator(vec![])
        .run(&["nothing".to_string()], &sim_options())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No matching test or entrypoint files found: [nothing]"
    );
}

// ── harness targets & snapshots ───────────────────────────────────────────

struct FakeRunner;

#[async_trait]
impl DeployedRunner for FakeRunner {
    async fn list_tests(&self) -> skylift_test::Result<Vec<String>> {
        Ok(vec!["root/env0/test:deployed".to_string()])
    }

    async fn run_test(&self, path: &str) -> skylift_test::Result<TestResult> {
        Ok(TestResult::passed(path, vec![]))
    }
}

#[derive(Default)]
struct FakeHarness {
    deploys: AtomicUsize,
    cleanups: AtomicUsize,
}

#[async_trait]
impl TestHarness for FakeHarness {
    async fn deploy(&self, out_dir: &Path) -> skylift_test::Result<Box<dyn DeployedRunner>> {
        assert!(out_dir.join(skylift_test::TEMPLATE_FILE).exists());
        self.deploys.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRunner))
    }

    async fn cleanup(&self, _out_dir: &Path) -> skylift_test::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const CLOUD_APP: &str = r#"{
    "resources": [{ "id": "Counter", "kind": "counter" }],
    "tests": [{ "name": "deployed", "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc"] }] }]
}"#;

const CLOUD_APP_WITH_BUCKET: &str = r#"{
    "resources": [{ "id": "Counter", "kind": "counter" }, { "id": "Bucket", "kind": "bucket" }],
    "tests": [{
        "name": "deployed",
        "lifts": [
            { "alias": "c", "resource": "Counter", "ops": ["inc"] },
            { "alias": "b", "resource": "Bucket", "ops": ["get"] }
        ]
    }]
}"#;

fn cloud_options(snapshots: SnapshotMode) -> TestOptions {
    TestOptions {
        target: Target::TfAws,
        snapshots,
        ..TestOptions::default()
    }
}

#[tokio::test]
async fn test_harness_target_deploys_and_cleans_up() {
    let fx = Fixture::new();
    let file = fx.write("cloud.test.json", CLOUD_APP);
    let harness = Arc::new(FakeHarness::default());

    let report = fx
        .orchestrator(vec![file])
        .with_harness(harness.clone())
        .run_report(&[], &cloud_options(SnapshotMode::Deploy))
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Deploy);
    assert_eq!(harness.deploys.load(Ordering::SeqCst), 1);
    assert_eq!(harness.cleanups.load(Ordering::SeqCst), 1);
    assert!(fx.has_line("pass ─ cloud.test.json » root/env0/test:deployed"));
}

#[tokio::test]
async fn test_missing_harness_fails_the_file() {
    let fx = Fixture::new();
    let file = fx.write("cloud.test.json", CLOUD_APP);

    let report = fx
        .orchestrator(vec![file])
        .run_report(&[], &cloud_options(SnapshotMode::Deploy))
        .await
        .unwrap();
    assert_eq!(report.exit_code, 1);
    assert_eq!(report.files[0].results[0].path, "*");
}

#[tokio::test]
async fn test_snapshot_update_then_assert() {
    let fx = Fixture::new();
    let file = fx.write("cloud.test.json", CLOUD_APP);
    let harness = Arc::new(FakeHarness::default());

    // Update: nothing is deployed, the artifact becomes the baseline.
    let report = fx
        .orchestrator(vec![file.clone()])
        .with_harness(harness.clone())
        .run_report(&[], &cloud_options(SnapshotMode::Update))
        .await
        .unwrap();
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Capture);
    assert!(FsSnapshotStore::snapshot_path(&file, Target::TfAws).exists());
    assert!(report.files[0].results.is_empty());

    // Assert: the artifact is compared against the baseline.
    let report = fx
        .orchestrator(vec![file.clone()])
        .with_harness(harness.clone())
        .run_report(&[], &cloud_options(SnapshotMode::Assert))
        .await
        .unwrap();
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Match);

    // A changed application no longer matches, but the exit code is unaffected.
    std::fs::write(&file, CLOUD_APP_WITH_BUCKET).unwrap();
    let report = fx
        .orchestrator(vec![file])
        .with_harness(harness.clone())
        .run_report(&[], &cloud_options(SnapshotMode::Assert))
        .await
        .unwrap();
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Mismatch);
    assert_eq!(report.exit_code, 0);
    assert!(fx.has_line("Snapshots mismatch in"));
    assert_eq!(harness.deploys.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_simulator_never_snapshots() {
    let fx = Fixture::new();
    let file = fx.write("fails.test.json", FAILING_APP);
    let options = TestOptions {
        snapshots: SnapshotMode::Assert,
        ..sim_options()
    };
    let report = fx.orchestrator(vec![file.clone()]).run_report(&[], &options).await.unwrap();
    assert_eq!(report.files[0].snapshot, SnapshotDecision::Skipped);
    assert!(!FsSnapshotStore::snapshot_path(&file, Target::Sim).exists());
}
