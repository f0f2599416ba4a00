//! The test runner: a resource other code can lift, and a host that test
//! functions are attached to.

use std::collections::BTreeSet;

use skylift_core::{
    env_binding_name, EnvBinding, HostBindings, HostKind, InflightHost, LiftBinder, LiftConfig,
    Liftable, Operation, Resource, ResourceKind, Result, Target,
};

/// Path segment of the runner under the application root.
pub const TEST_RUNNER_ID: &str = "cloud.TestRunner";

/// Test runner of one application.
///
/// Instead of one binding per test function, the runner exposes a single
/// binding holding the serialized `[test path, function identity]` pairs.
#[derive(Debug, Clone)]
pub struct TestRunner {
    resource: Resource,
    tests: Vec<(String, String)>,
    functions: Vec<Resource>,
}

impl TestRunner {
    pub fn new(root_id: &str, target: Target) -> Self {
        let path = format!("{root_id}/{TEST_RUNNER_ID}");
        Self {
            resource: Resource::managed(path, ResourceKind::TestRunner, target),
            tests: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Register the function backing the test at `test_path`.
    pub fn register(&mut self, test_path: impl Into<String>, function: &Resource) {
        self.tests
            .push((test_path.into(), function.identity.to_string()));
        self.functions.push(function.clone());
    }

    /// `[test path, function identity]` pairs in registration order.
    pub fn tests(&self) -> &[(String, String)] {
        &self.tests
    }

    /// Name of the binding carrying the test mapping.
    pub fn binding_name(&self, config: &LiftConfig) -> String {
        env_binding_name(
            ResourceKind::TestRunner.env_prefix(),
            &self.resource.path,
            config.env_suffix_len,
        )
    }

    /// Bind the runner onto itself: the mapping binding, `invoke` on every
    /// test function and a provisioning dependency on each of them.
    pub fn bind(&self, binder: &mut LiftBinder<'_>) -> Result<HostBindings> {
        let mut host = HostBindings::for_host(self);
        binder.lift(self, &mut host, std::iter::empty::<Operation>())?;

        let invoke: BTreeSet<Operation> = [Operation::new("invoke")].into_iter().collect();
        for function in &self.functions {
            let grants = function.grants(&invoke, binder.target())?;
            binder.attach_grants(&mut host, grants);
            binder.depend(&mut host, &function.path);
        }
        Ok(host)
    }

    /// Parse a mapping produced by [`Liftable::env_bindings`].
    pub fn parse_mapping(raw: &str) -> serde_json::Result<Vec<(String, String)>> {
        serde_json::from_str(raw)
    }
}

impl Liftable for TestRunner {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn env_bindings(&self, config: &LiftConfig) -> Result<Vec<EnvBinding>> {
        Ok(vec![EnvBinding {
            name: self.binding_name(config),
            value: serde_json::to_string(&self.tests)?,
        }])
    }

    fn supports_host(&self, kind: HostKind) -> bool {
        kind != HostKind::Website
    }
}

impl InflightHost for TestRunner {
    fn host_path(&self) -> &str {
        &self.resource.path
    }

    fn host_kind(&self) -> HostKind {
        HostKind::TestRunner
    }
}
