//! Test orchestration.
//!
//! Per file:
//!
//! ```text
//! Pending -> Compiling -> Executing -> Passed | Failed -> [Retrying -> Compiling ...] -> Reported
//! ```
//!
//! Files are admitted in discovery order through a semaphore sized by
//! `parallel` and run as independent tasks, each against its own simulator.
//! A file with any result that did not pass (unsupported ones included) is
//! recompiled and rerun as a whole until it passes or runs out of attempts;
//! only the last attempt's results are kept. Construction errors abort the
//! whole run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{warn, Instrument};
use uuid::Uuid;

use skylift_core::obs::{
    emit_file_error, emit_file_finished, emit_retry, emit_run_finished, emit_run_started,
    file_span,
};
use skylift_core::{test_name_from_path, Target, TestResult, TraceEvent};
use skylift_sim::{Handlers, SimError, Simulator};

use crate::compile::{CompiledApp, Compiler};
use crate::discovery::TestFileDiscovery;
use crate::error::{Result, TestError};
use crate::filter::TestFilter;
use crate::harness::TestHarness;
use crate::options::TestOptions;
use crate::report::{
    format_trace, render_summary, render_test_report, should_skip_trace, ReportSink, StdoutSink,
    TraceFormat,
};
use crate::results::{validate_output_file_path, write_results_to_file, FileResults};
use crate::snapshot::{capture_snapshot, FsSnapshotStore, SnapshotDecision, SnapshotMode, SnapshotStore};
use crate::trace_processor::TraceProcessor;

/// Lifecycle of one test file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Compiling,
    Executing,
    Passed,
    Failed,
    Retrying,
    Reported,
}

/// Hooks for watching a run. Called synchronously from the file's task.
pub trait RunObserver: Send + Sync {
    fn on_state(&self, _file: &Path, _state: FileState) {}

    /// Every trace emitted by the file's simulator, in emission order.
    fn on_trace(&self, _file: &Path, _trace: &TraceEvent) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub files: Vec<FileResults>,
    pub duration_ms: u64,
    pub exit_code: i32,
}

impl RunReport {
    pub fn total_tests(&self) -> usize {
        self.files.iter().map(|f| f.results.len()).sum()
    }
}

/// Exit status of a run: `1` iff some result failed and is not unsupported.
pub fn exit_code(files: &[FileResults]) -> i32 {
    if files.iter().any(FileResults::has_failure) {
        1
    } else {
        0
    }
}

pub struct Orchestrator {
    discovery: Arc<dyn TestFileDiscovery>,
    compiler: Arc<dyn Compiler>,
    handlers: Handlers,
    harness: Option<Arc<dyn TestHarness>>,
    snapshots: Arc<dyn SnapshotStore>,
    sink: Arc<dyn ReportSink>,
    observer: Arc<dyn RunObserver>,
}

impl Orchestrator {
    pub fn new<D, C>(discovery: D, compiler: C) -> Self
    where
        D: TestFileDiscovery + 'static,
        C: Compiler + 'static,
    {
        Self {
            discovery: Arc::new(discovery),
            compiler: Arc::new(compiler),
            handlers: Handlers::new(),
            harness: None,
            snapshots: Arc::new(FsSnapshotStore),
            sink: Arc::new(StdoutSink),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Rust handlers that manifests refer to by name.
    pub fn with_handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Harness used for every target other than `sim`.
    pub fn with_harness(mut self, harness: Arc<dyn TestHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = store;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every selected test file and return the process exit code.
    pub async fn run(&self, entrypoints: &[String], options: &TestOptions) -> Result<i32> {
        Ok(self.run_report(entrypoints, options).await?.exit_code)
    }

    pub async fn run_report(&self, entrypoints: &[String], options: &TestOptions) -> Result<RunReport> {
        if let Some(path) = &options.output_file {
            validate_output_file_path(path)?;
        }
        let filter = TestFilter::new(options.test_filter.as_deref())?;

        let files = self.discovery.discover(entrypoints)?;
        if files.is_empty() {
            return Err(TestError::NoTestFiles {
                entrypoints: entrypoints.to_vec(),
            });
        }

        let target = options.target;
        emit_run_started(target.name(), files.len(), options.parallel, options.attempts());
        let started = Instant::now();

        let ctx = Arc::new(FileRunner {
            compiler: Arc::clone(&self.compiler),
            handlers: self.handlers.clone(),
            harness: self.harness.clone(),
            snapshots: Arc::clone(&self.snapshots),
            sink: Arc::clone(&self.sink),
            observer: Arc::clone(&self.observer),
            options: options.clone(),
            filter,
        });
        let permits = (options.parallel > 0).then(|| Arc::new(Semaphore::new(options.parallel)));

        for file in &files {
            self.observer.on_state(file, FileState::Pending);
        }

        // Files are admitted from this task so a slot always goes to the
        // earliest waiting file, whichever worker thread picks it up.
        let mut handles = Vec::with_capacity(files.len());
        for file in files {
            let permit = match &permits {
                Some(sem) => match Arc::clone(sem).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        abort_all(&handles);
                        return Err(TestError::Task(e.to_string()));
                    }
                },
                None => None,
            };
            let ctx = Arc::clone(&ctx);
            let span = file_span(&file.display().to_string(), target.name());
            handles.push(tokio::spawn(
                async move {
                    let _permit = permit;
                    ctx.test_file(file).await
                }
                .instrument(span),
            ));
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let joined = try_join_all(handles.into_iter().map(|handle| async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(TestError::Task(e.to_string())),
            }
        }))
        .await;
        let files = match joined {
            Ok(files) => files,
            Err(e) => {
                for abort in &aborts {
                    abort.abort();
                }
                return Err(e);
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.sink.write_line(&render_summary(&files, duration_ms));
        if let Some(path) = &options.output_file {
            write_results_to_file(&files, duration_ms, target, path)?;
        }

        let exit_code = exit_code(&files);
        let total = files.iter().map(|f| f.results.len()).sum();
        let failed = files
            .iter()
            .flat_map(|f| f.results.iter())
            .filter(|r| r.is_failure())
            .count();
        emit_run_finished(target.name(), duration_ms, total, failed);

        Ok(RunReport {
            files,
            duration_ms,
            exit_code,
        })
    }
}

/// State shared by the tasks of one run.
struct FileRunner {
    compiler: Arc<dyn Compiler>,
    handlers: Handlers,
    harness: Option<Arc<dyn TestHarness>>,
    snapshots: Arc<dyn SnapshotStore>,
    sink: Arc<dyn ReportSink>,
    observer: Arc<dyn RunObserver>,
    options: TestOptions,
    filter: TestFilter,
}

fn abort_all<T>(handles: &[JoinHandle<T>]) {
    for handle in handles {
        handle.abort();
    }
}

fn display_name(file: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| file.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| file.to_path_buf())
        .display()
        .to_string()
}

fn random_root_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("Test.{}", &id[..10])
}

impl FileRunner {
    async fn test_file(&self, file: PathBuf) -> Result<FileResults> {
        let name = display_name(&file);
        let mut remaining = self.options.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (results, snapshot) = match self.test_one(&file).await {
                Ok((results, snapshot)) => {
                    let failed = results.iter().any(|r| !r.pass);
                    self.state(&file, if failed { FileState::Failed } else { FileState::Passed });
                    if failed && remaining > 1 {
                        remaining -= 1;
                        self.retrying(&file, &name, remaining);
                        continue;
                    }
                    (results, snapshot)
                }
                Err(e) if e.is_construction() => return Err(e),
                Err(e) => {
                    emit_file_error(&name, &e);
                    self.sink.write_line(&e.to_string());
                    self.state(&file, FileState::Failed);
                    if remaining > 1 {
                        remaining -= 1;
                        self.retrying(&file, &name, remaining);
                        continue;
                    }
                    (
                        vec![TestResult::failed("*", e.to_string(), Vec::new())],
                        SnapshotDecision::Skipped,
                    )
                }
            };

            let passed = results.iter().filter(|r| r.pass).count();
            emit_file_finished(&name, passed, results.len() - passed, attempt);
            self.state(&file, FileState::Reported);
            return Ok(FileResults {
                file,
                name,
                results,
                snapshot,
                attempts: attempt,
            });
        }
    }

    fn state(&self, file: &Path, state: FileState) {
        self.observer.on_state(file, state);
    }

    fn retrying(&self, file: &Path, name: &str, remaining: u32) {
        self.sink
            .write_line(&format!("Retrying failed tests. {remaining} retries left."));
        emit_retry(name, remaining);
        self.state(file, FileState::Retrying);
    }

    /// One attempt: compile, execute, snapshot.
    async fn test_one(&self, file: &Path) -> Result<(Vec<TestResult>, SnapshotDecision)> {
        let target = self.options.target;
        let mode = self.options.snapshots.resolve(target, self.options.ci);

        let mut results = Vec::new();
        if mode.should_execute() {
            let root_id = match &self.options.root_id {
                Some(root_id) => root_id.clone(),
                None if target == Target::Sim => "root".to_string(),
                None => random_root_id(),
            };

            self.state(file, FileState::Compiling);
            let compiled = self.compiler.compile(file, target, &root_id).await?;
            self.state(file, FileState::Executing);
            results = if target == Target::Sim {
                self.run_simulator(file, &compiled).await?
            } else {
                self.run_harness(file, &compiled).await?
            };
        }

        let snapshot = if results.iter().all(|r| r.pass) {
            self.snapshot(file, mode).await?
        } else {
            SnapshotDecision::Skipped
        };
        Ok((results, snapshot))
    }

    async fn snapshot(&self, file: &Path, mode: SnapshotMode) -> Result<SnapshotDecision> {
        match mode {
            SnapshotMode::Update | SnapshotMode::Assert => {
                let target = self.options.target;
                let compiled = self.compiler.compile(file, target, "root").await?;
                let decision = capture_snapshot(
                    self.snapshots.as_ref(),
                    file,
                    target,
                    mode,
                    &compiled.template(),
                );
                remove_out_dir(&compiled.out_dir);
                decision
            }
            SnapshotMode::Deploy => Ok(SnapshotDecision::Deploy),
            SnapshotMode::Never | SnapshotMode::Auto => Ok(SnapshotDecision::Never),
        }
    }

    async fn run_simulator(&self, file: &Path, compiled: &CompiledApp) -> Result<Vec<TestResult>> {
        let mut sim = Simulator::from_simfile(&compiled.simfile(), &self.handlers)?;
        let debug = self.options.debug;

        let processor = self.options.stream.then(|| {
            let sink = Arc::clone(&self.sink);
            TraceProcessor::new(move |event: TraceEvent| {
                let sink = Arc::clone(&sink);
                async move {
                    if should_skip_trace(&event, debug) {
                        return;
                    }
                    let test = event
                        .data
                        .extra
                        .get("test")
                        .and_then(Value::as_str)
                        .unwrap_or("(no test)")
                        .to_string();
                    sink.write_line(&format_trace(&event, &test, TraceFormat::for_debug(debug)));
                }
            })
        });

        let current: Arc<Mutex<Option<String>>> = Arc::default();
        {
            let observer = Arc::clone(&self.observer);
            let queue = processor.as_ref().map(TraceProcessor::queue);
            let current = Arc::clone(&current);
            let file = file.to_path_buf();
            sim.on_trace(move |trace| {
                observer.on_trace(&file, trace);
                if let Some(queue) = &queue {
                    let mut event = trace.clone();
                    if let Some(test) = lock(&current).clone() {
                        event.data.extra.insert("test".to_string(), Value::String(test));
                    }
                    queue.add_event(event);
                }
            });
        }

        let tests = self.filter.apply(sim.list_tests());
        let outcome = self.drive(&mut sim, &tests, &current).await;
        if let Some(processor) = processor {
            processor.finish().await;
        }
        self.clean_up(&compiled.out_dir);
        let results = outcome?;

        self.sink.write_line(&render_test_report(
            file,
            &results,
            !self.options.stream,
            debug,
        ));
        Ok(results)
    }

    /// Run `tests` in order: once per file, or around each test when isolated.
    async fn drive(
        &self,
        sim: &mut Simulator,
        tests: &[String],
        current: &Mutex<Option<String>>,
    ) -> Result<Vec<TestResult>> {
        let mut results = Vec::with_capacity(tests.len());
        if tests.is_empty() {
            return Ok(results);
        }

        if self.options.isolate_tests {
            for test in tests {
                *lock(current) = test_name_from_path(test).map(str::to_string);
                sim.start().await?;
                results.push(sim.run_test(test).await?);
                stop_quietly(sim).await;
                sim.reset_state().await?;
            }
        } else {
            sim.start().await?;
            for test in tests {
                *lock(current) = test_name_from_path(test).map(str::to_string);
                results.push(sim.run_test(test).await?);
            }
            stop_quietly(sim).await;
            sim.reset_state().await?;
        }
        Ok(results)
    }

    async fn run_harness(&self, file: &Path, compiled: &CompiledApp) -> Result<Vec<TestResult>> {
        let harness = self
            .harness
            .as_ref()
            .ok_or(TestError::NoHarness(self.options.target))?;
        let out_dir = &compiled.out_dir;

        let outcome: Result<Vec<TestResult>> = async {
            let runner = harness.deploy(out_dir).await?;
            let tests = self.filter.apply(runner.list_tests().await?);
            let mut results = Vec::with_capacity(tests.len());
            for test in &tests {
                results.push(runner.run_test(test).await?);
            }
            Ok(results)
        }
        .await;

        let results = match outcome {
            Ok(results) => {
                self.sink
                    .write_line(&render_test_report(file, &results, true, self.options.debug));
                if results.iter().any(|r| !r.pass) {
                    self.sink
                        .write_line("One or more tests failed. Cleaning up resources...");
                }
                results
            }
            Err(e) => {
                warn!(error = %e, "harness failure");
                vec![TestResult::failed("", e.to_string(), Vec::new())]
            }
        };

        if self.options.clean {
            if let Err(e) = harness.cleanup(out_dir).await {
                warn!(error = %e, "harness cleanup failed");
            }
        }
        self.clean_up(out_dir);
        Ok(results)
    }

    fn clean_up(&self, out_dir: &Path) {
        if self.options.clean {
            remove_out_dir(out_dir);
        } else {
            self.sink.write_line(&format!(
                "Cleanup is disabled!\nOutput files available at {}",
                out_dir.display()
            ));
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Teardown errors never fail a run; results are already final.
async fn stop_quietly(sim: &mut Simulator) {
    match sim.stop().await {
        Ok(()) => {}
        Err(SimError::Teardown { errors }) => {
            warn!(errors = ?errors, "resources failed to stop");
        }
        Err(e) => warn!(error = %e, "failed to stop simulator"),
    }
}

fn remove_out_dir(out_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(out_dir) {
        warn!(dir = %out_dir.display(), error = %e, "unable to clean up test directory");
    }
}
