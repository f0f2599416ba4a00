//! SkyLift Sim - local simulator for lifted applications
//!
//! Builds the resource tree of a test file, runs it in-process and drives
//! the test runner:
//! - Declares resources, functions and tests from a JSON manifest
//! - Lifts every binding through a backend (sim tables or a deployment template)
//! - Enforces per-host grants on every inflight call
//! - Persists resource state across stop/start

pub mod app;
pub mod clients;
pub mod error;
pub mod inflight;
pub mod manifest;
pub mod resources;
pub mod runner;
pub mod script;
pub mod simulator;
pub mod tracer;

// Re-export key types
pub use app::{App, AppBuilder, FunctionSpec, ResourceSpec, TestEntry, SIMFILE};
pub use clients::{
    BucketClient, CounterClient, FunctionClient, QueueClient, ResourceClient, SecretClient,
};
pub use error::{InflightError, InflightResult, SimError, SimResult, SimState};
pub use inflight::{Handlers, InflightContext, InflightHandler};
pub use manifest::{AppManifest, FunctionDecl, InflightCode, LiftDecl, ResourceDecl, Step, TestDecl};
pub use resources::{FailingCleanup, Registry, SimResource};
pub use runner::{TestRunner, TEST_RUNNER_ID};
pub use script::ScriptHandler;
pub use simulator::Simulator;
pub use tracer::Tracer;
