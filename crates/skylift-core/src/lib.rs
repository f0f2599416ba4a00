//! SkyLift core: resource model, permission calculation and lift bindings.
//!
//! A preflight program declares resources; inflight code (functions, test
//! runners) uses them at run time. Lifting a resource onto a host gives the
//! host an environment binding for the resource's identity, the minimal grant
//! for the operations it uses, and a provisioning dependency.

pub mod backend;
pub mod domain;
pub mod lift;
pub mod obs;
pub mod permissions;
pub mod telemetry;

pub use backend::{LiftBackend, SimBackend, SimTables, TemplateBackend, TemplateHost};
pub use domain::{
    test_name_from_path, AccessLevel, HostKind, LiftError, LogLevel, Operation, Provider,
    Resource, ResourceIdentity, ResourceKind, Result, Target, TestResult, TraceData, TraceEvent,
    TraceType,
};
pub use lift::{
    env_binding_name, EnvBinding, HostBindings, InflightHost, LiftBinder, LiftConfig, Liftable,
    DEFAULT_ENV_SUFFIX_LEN,
};
pub use permissions::{compute_grant, required_access, GrantFragment};
pub use telemetry::init_tracing;
