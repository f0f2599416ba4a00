//! The resource tree lifecycle: start, run tests, stop, reset.
//!
//! ```text
//! Constructed --start--> Started --stop--> Stopped --reset_state--> Constructed
//!                           ^                  |
//!                           +------start-------+   (resumes persisted state)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use skylift_core::obs::{emit_resource_started, emit_resource_stopped};
use skylift_core::{
    LogLevel, ResourceIdentity, ResourceKind, SimTables, Target, TestResult, TraceEvent, TraceType,
};

use crate::app::App;
use crate::error::{SimError, SimResult, SimState};
use crate::inflight::{Handlers, InflightContext, InflightHandler};
use crate::resources::{
    BucketSim, CounterSim, FailingCleanup, FunctionSim, QueueSim, Registry, SecretSim, SimResource,
    TestRunnerSim,
};
use crate::runner::TestRunner;
use crate::tracer::Tracer;

#[derive(Debug, Clone, Copy)]
enum Node {
    Data(usize),
    Function(usize),
    Runner,
}

/// A simulated application.
pub struct Simulator {
    app: Arc<App>,
    tables: Arc<SimTables>,
    handlers: Vec<Arc<dyn InflightHandler>>,
    runner_tests: Vec<(String, String)>,
    order: Vec<Node>,
    state: SimState,
    running: Option<Running>,
    state_store: BTreeMap<String, Value>,
    tracer: Tracer,
}

struct Running {
    /// Keeps resources alive; inflight contexts only hold weak references.
    _registry: Arc<Registry>,
    started: Vec<(String, Arc<dyn SimResource>)>,
    runner: Arc<TestRunnerSim>,
}

impl Simulator {
    /// Prepare a simulator for `app`. Nothing starts until [`Simulator::start`].
    pub fn new(app: App, handlers: &Handlers) -> SimResult<Self> {
        if app.target != Target::Sim {
            return Err(SimError::Manifest(format!(
                "cannot simulate an application built for {}",
                app.target
            )));
        }

        let resolved = app
            .functions
            .iter()
            .map(|f| handlers.resolve(&f.resource.path, &f.code))
            .collect::<SimResult<Vec<_>>>()?;

        let runner_tests = match app.hosts.get(&app.runner) {
            Some(host) => match host
                .environment()
                .iter()
                .find(|(name, _)| name.starts_with(ResourceKind::TestRunner.env_prefix()))
            {
                Some((_, raw)) => TestRunner::parse_mapping(raw)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let order = start_order(&app)?;
        let tables = Arc::new(app.tables.clone());
        Ok(Self {
            app: Arc::new(app),
            tables,
            handlers: resolved,
            runner_tests,
            order,
            state: SimState::Constructed,
            running: None,
            state_store: BTreeMap::new(),
            tracer: Tracer::new(),
        })
    }

    /// Load a simfile written by [`App::write_simfile`].
    pub fn from_simfile(path: &Path, handlers: &Handlers) -> SimResult<Self> {
        Self::new(App::read_simfile(path)?, handlers)
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Subscribe to every trace, invoked synchronously on emission.
    pub fn on_trace<F>(&self, callback: F)
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        self.tracer.subscribe(callback);
    }

    /// Test paths in declaration order. Valid in any state.
    pub fn list_tests(&self) -> Vec<String> {
        self.app.test_paths()
    }

    /// Resource paths in start order.
    pub fn start_order(&self) -> Vec<String> {
        self.order.iter().map(|n| self.node_path(*n).to_string()).collect()
    }

    /// Start every resource in dependency order.
    ///
    /// If a resource fails to initialise, the ones already started are torn
    /// down and the first error is returned.
    pub async fn start(&mut self) -> SimResult<()> {
        if self.state == SimState::Started {
            return Err(SimError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let mut instances: Vec<(String, String, Arc<dyn SimResource>)> = Vec::new();
        let mut runner: Option<Arc<TestRunnerSim>> = None;
        let registry = Arc::new_cyclic(|weak: &Weak<Registry>| {
            let mut registry = Registry::default();
            for node in &self.order {
                let (identity, resource) = match *node {
                    Node::Runner => {
                        let sim = Arc::new(TestRunnerSim::new(
                            self.app.runner.clone(),
                            self.runner_tests.clone(),
                            Arc::clone(&self.tables),
                            weak.clone(),
                            self.tracer.clone(),
                        ));
                        runner = Some(Arc::clone(&sim));
                        let identity = ResourceIdentity::synthesize(
                            ResourceKind::TestRunner,
                            Target::Sim,
                            &self.app.runner,
                        );
                        (identity.to_string(), sim as Arc<dyn SimResource>)
                    }
                    Node::Data(i) => self.data_resource(i),
                    Node::Function(i) => self.function_resource(i, weak),
                };
                let path = self.node_path(*node).to_string();
                registry.insert(identity.clone(), Arc::clone(&resource));
                instances.push((path, identity, resource));
            }
            registry
        });
        let Some(runner) = runner else {
            return Err(SimError::UnknownResource(self.app.runner.clone()));
        };

        let mut started: Vec<(String, Arc<dyn SimResource>)> = Vec::new();
        for (path, _identity, resource) in instances {
            let saved = self.state_store.get(&path).cloned();
            if let Err(reason) = resource.init(saved).await {
                for (started_path, done) in started.iter().rev() {
                    if let Err(e) = done.cleanup().await {
                        warn!(path = %started_path, error = %e, "cleanup after failed start");
                    }
                }
                return Err(SimError::Init { path, reason });
            }
            emit_resource_started(&path, &resource.kind().to_string());
            started.push((path, resource));
        }

        self.running = Some(Running {
            _registry: registry,
            started,
            runner,
        });
        self.state = SimState::Started;
        self.simulator_trace("Simulator started");
        Ok(())
    }

    /// Run one test. Valid only while started.
    pub async fn run_test(&self, path: &str) -> SimResult<TestResult> {
        let running = match (&self.running, self.state) {
            (Some(running), SimState::Started) => running,
            _ => {
                return Err(SimError::InvalidState {
                    operation: "run a test",
                    state: self.state,
                })
            }
        };
        if !self.app.tests.iter().any(|t| t.path == path) {
            return Err(SimError::UnknownTest(path.to_string()));
        }
        debug!(test = %path, "running test");
        Ok(running.runner.run_test(path).await)
    }

    /// Stop every resource in reverse start order.
    ///
    /// Teardown is best effort: every resource is stopped and every failure
    /// is collected into one [`SimError::Teardown`].
    pub async fn stop(&mut self) -> SimResult<()> {
        if self.state != SimState::Started {
            return Err(SimError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }
        let Some(running) = self.running.take() else {
            return Err(SimError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        };

        let mut errors = Vec::new();
        for (path, resource) in running.started.iter().rev() {
            if let Some(state) = resource.save().await {
                self.state_store.insert(path.clone(), state);
            }
            if let Err(e) = resource.cleanup().await {
                errors.push(format!("{path}: {e}"));
            }
            emit_resource_stopped(path, &resource.kind().to_string());
        }

        self.state = SimState::Stopped;
        self.simulator_trace("Simulator stopped");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SimError::Teardown { errors })
        }
    }

    /// Forget persisted state. Valid only after [`Simulator::stop`].
    pub async fn reset_state(&mut self) -> SimResult<()> {
        if self.state != SimState::Stopped {
            return Err(SimError::InvalidState {
                operation: "reset state",
                state: self.state,
            });
        }
        self.state_store.clear();
        self.state = SimState::Constructed;
        Ok(())
    }

    /// State persisted by the last stop, keyed by resource path.
    pub fn persisted_state(&self) -> &BTreeMap<String, Value> {
        &self.state_store
    }

    fn simulator_trace(&self, message: &str) {
        self.tracer.emit(TraceEvent::new(
            &self.app.root_id,
            "simulator",
            TraceType::Simulator,
            LogLevel::Verbose,
            message,
        ));
    }

    fn node_path(&self, node: Node) -> &str {
        match node {
            Node::Data(i) => &self.app.resources[i].resource.path,
            Node::Function(i) => &self.app.functions[i].resource.path,
            Node::Runner => &self.app.runner,
        }
    }

    fn data_resource(&self, i: usize) -> (String, Arc<dyn SimResource>) {
        let spec = &self.app.resources[i];
        let path = spec.resource.path.clone();
        let initial = spec.initial.clone();
        let tracer = self.tracer.clone();
        let resource: Arc<dyn SimResource> = match spec.resource.kind {
            ResourceKind::Counter => Arc::new(CounterSim::new(path, initial, tracer)),
            ResourceKind::Queue => Arc::new(QueueSim::new(path, initial, tracer)),
            ResourceKind::Secret => Arc::new(SecretSim::new(path, initial, tracer)),
            _ => Arc::new(BucketSim::new(path, initial, tracer)),
        };
        let resource: Arc<dyn SimResource> = match &spec.cleanup_error {
            Some(error) => Arc::new(FailingCleanup::new(resource, error.clone())),
            None => resource,
        };
        (spec.resource.identity.to_string(), resource)
    }

    fn function_resource(&self, i: usize, registry: &Weak<Registry>) -> (String, Arc<dyn SimResource>) {
        let spec = &self.app.functions[i];
        let path = spec.resource.path.clone();
        let environment = self
            .app
            .hosts
            .get(&path)
            .map(|h| h.environment().clone())
            .unwrap_or_default();
        let ctx = InflightContext::new(
            path.clone(),
            environment,
            spec.aliases.clone(),
            Arc::clone(&self.tables),
            registry.clone(),
            self.tracer.clone(),
        );
        let resource = Arc::new(FunctionSim::new(
            path,
            Arc::clone(&self.handlers[i]),
            ctx,
            self.tracer.clone(),
        ));
        (spec.resource.identity.to_string(), resource)
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("root", &self.app.root_id)
            .field("state", &self.state)
            .field("resources", &self.order.len())
            .finish()
    }
}

/// Topological start order over provisioning dependencies.
///
/// Among nodes whose dependencies are all satisfied, the one declared first
/// starts first.
fn start_order(app: &App) -> SimResult<Vec<Node>> {
    let mut nodes: Vec<(Node, &str)> = Vec::new();
    nodes.extend(
        app.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (Node::Data(i), r.resource.path.as_str())),
    );
    nodes.extend(
        app.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (Node::Function(i), f.resource.path.as_str())),
    );
    nodes.push((Node::Runner, app.runner.as_str()));

    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, (_, p))| (*p, i)).collect();
    let mut indegree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (_, path)) in nodes.iter().enumerate() {
        for dep in app.tables.dependencies_of(path) {
            if let Some(&j) = index.get(dep.as_str()) {
                indegree[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_first() {
        order.push(nodes[i].0);
        for &k in &dependents[i] {
            indegree[k] -= 1;
            if indegree[k] == 0 {
                ready.insert(k);
            }
        }
    }

    if order.len() != nodes.len() {
        let paths = (0..nodes.len())
            .filter(|&i| indegree[i] > 0)
            .map(|i| nodes[i].1.to_string())
            .collect();
        return Err(SimError::DependencyCycle { paths });
    }
    Ok(order)
}
