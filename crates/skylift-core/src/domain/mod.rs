//! Domain model: resources, hosts, traces and test results.

pub mod error;
pub mod resource;
pub mod test_result;
pub mod trace;

pub use error::{LiftError, Result};
pub use resource::{
    AccessLevel, HostKind, Operation, Provider, Resource, ResourceIdentity, ResourceKind, Target,
};
pub use test_result::{test_name_from_path, TestResult};
pub use trace::{LogLevel, TraceData, TraceEvent, TraceType};
