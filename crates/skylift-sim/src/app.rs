//! Resource graph construction from a manifest.
//!
//! Every test gets its own environment `<root>/env<i>` holding a private copy
//! of the declared resources and functions plus that one test. Lifts are
//! applied per environment, then the test runner at `<root>/cloud.TestRunner`
//! is bound to every test function.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use skylift_core::{
    HostBindings, HostKind, LiftBackend, LiftBinder, LiftConfig, Liftable, Resource,
    ResourceIdentity, ResourceKind, SimBackend, SimTables, Target, TemplateBackend,
};

use crate::error::{SimError, SimResult};
use crate::manifest::{AppManifest, InflightCode, LiftDecl};
use crate::runner::TestRunner;

/// File name of a serialized [`App`] inside a compiled output directory.
pub const SIMFILE: &str = "simfile.json";

/// A data resource and its declared initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub resource: Resource,
    #[serde(default)]
    pub initial: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

/// A function (or test handler) and the bindings its code refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub resource: Resource,
    pub host: HostKind,
    pub code: InflightCode,
    /// alias -> environment binding name
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    /// `<root>/env<i>/test:<name>`
    pub path: String,
    /// Path of the function running the test.
    pub function: String,
}

/// A constructed application graph for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub target: Target,
    pub root_id: String,
    pub resources: Vec<ResourceSpec>,
    pub functions: Vec<FunctionSpec>,
    pub tests: Vec<TestEntry>,
    pub runner: String,
    pub hosts: BTreeMap<String, HostBindings>,
    /// Simulation tables; empty unless the target is `sim`.
    #[serde(default)]
    pub tables: SimTables,
    /// Declarative template; present for non-simulator targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
}

impl App {
    /// Test paths in declaration order.
    pub fn test_paths(&self) -> Vec<String> {
        self.tests.iter().map(|t| t.path.clone()).collect()
    }

    pub fn write_simfile(&self, dir: &Path) -> SimResult<PathBuf> {
        let path = dir.join(SIMFILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    pub fn read_simfile(path: &Path) -> SimResult<Self> {
        let raw = std::fs::read(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Builds an [`App`] from a manifest for one target.
#[derive(Debug, Clone)]
pub struct AppBuilder {
    target: Target,
    root_id: String,
    config: LiftConfig,
}

impl AppBuilder {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            root_id: "root".to_string(),
            config: LiftConfig::default(),
        }
    }

    pub fn root_id(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = root_id.into();
        self
    }

    pub fn lift_config(mut self, config: LiftConfig) -> Self {
        self.config = config;
        self
    }

    /// Build with the target's own backend: simulation tables for `sim`,
    /// a rendered template otherwise.
    pub fn build(&self, manifest: &AppManifest) -> SimResult<App> {
        if self.target == Target::Sim {
            let mut backend = SimBackend::default();
            let mut app = self.build_with(manifest, &mut backend)?;
            app.tables = backend.into_tables();
            Ok(app)
        } else {
            let mut backend = TemplateBackend::new(self.target.name());
            let mut app = self.build_with(manifest, &mut backend)?;
            app.template = Some(backend.render());
            Ok(app)
        }
    }

    /// Build, realizing every binding through `backend`.
    pub fn build_with(&self, manifest: &AppManifest, backend: &mut dyn LiftBackend) -> SimResult<App> {
        manifest.validate()?;

        let root = &self.root_id;
        let mut binder = LiftBinder::new(self.target, self.config.clone(), backend);
        let mut runner = TestRunner::new(root, self.target);
        let mut app = App {
            target: self.target,
            root_id: root.clone(),
            resources: Vec::new(),
            functions: Vec::new(),
            tests: Vec::new(),
            runner: runner.resource().path.clone(),
            hosts: BTreeMap::new(),
            tables: SimTables::default(),
            template: None,
        };

        let env_count = manifest.tests.len().max(1);
        for i in 0..env_count {
            let env = format!("{root}/env{i}");
            let mut scope: HashMap<&str, Resource> = HashMap::new();

            for decl in &manifest.resources {
                let path = format!("{env}/{}", decl.id);
                let resource = match &decl.identity {
                    Some(identity) => Resource::imported(
                        path,
                        decl.kind,
                        ResourceIdentity::new(identity.clone()),
                        self.target,
                    )?,
                    None => Resource::managed(path, decl.kind, self.target),
                };
                scope.insert(decl.id.as_str(), resource.clone());
                app.resources.push(ResourceSpec {
                    resource,
                    initial: decl.initial.clone(),
                    cleanup_error: decl.cleanup_error.clone(),
                });
            }

            for decl in &manifest.functions {
                let path = format!("{env}/{}", decl.id);
                let resource = Resource::managed(path, ResourceKind::Function, self.target);
                scope.insert(decl.id.as_str(), resource);
            }
            for decl in &manifest.functions {
                let resource = scope[decl.id.as_str()].clone();
                let spec = self.lift_function(
                    &mut binder,
                    &mut app.hosts,
                    resource,
                    decl.host,
                    &decl.lifts,
                    &decl.code,
                    &scope,
                )?;
                app.functions.push(spec);
            }

            if let Some(test) = manifest.tests.get(i) {
                let test_path = format!("{env}/test:{}", test.name);
                let handler = Resource::managed(
                    format!("{test_path}/Handler"),
                    ResourceKind::Function,
                    self.target,
                );
                runner.register(test_path.clone(), &handler);
                let spec = self.lift_function(
                    &mut binder,
                    &mut app.hosts,
                    handler,
                    HostKind::Function,
                    &test.lifts,
                    &test.code,
                    &scope,
                )?;
                app.tests.push(TestEntry {
                    path: test_path,
                    function: spec.resource.path.clone(),
                });
                app.functions.push(spec);
            }
        }

        let runner_host = runner.bind(&mut binder)?;
        app.hosts.insert(runner_host.path().to_string(), runner_host);

        info!(
            target = %self.target,
            root = %root,
            resources = app.resources.len(),
            functions = app.functions.len(),
            tests = app.tests.len(),
            "built application graph"
        );
        Ok(app)
    }

    #[allow(clippy::too_many_arguments)]
    fn lift_function(
        &self,
        binder: &mut LiftBinder<'_>,
        hosts: &mut BTreeMap<String, HostBindings>,
        resource: Resource,
        host_kind: HostKind,
        lifts: &[LiftDecl],
        code: &InflightCode,
        scope: &HashMap<&str, Resource>,
    ) -> SimResult<FunctionSpec> {
        let mut host = HostBindings::new(resource.path.clone(), host_kind);
        let mut aliases = BTreeMap::new();

        for lift in lifts {
            let target = scope.get(lift.resource.as_str()).ok_or_else(|| {
                SimError::Manifest(format!(
                    "{} lifts unknown resource {}",
                    resource.path, lift.resource
                ))
            })?;
            binder.lift(target, &mut host, lift.ops.iter().cloned())?;
            let binding = target
                .env_bindings(binder.config())?
                .into_iter()
                .next()
                .map(|b| b.name)
                .ok_or_else(|| {
                    SimError::Manifest(format!("{} exposes no binding", target.path))
                })?;
            aliases.insert(lift.alias.clone(), binding);
        }

        debug!(host = %resource.path, bindings = aliases.len(), "lifted function");
        hosts.insert(resource.path.clone(), host);
        Ok(FunctionSpec {
            resource,
            host: host_kind,
            code: code.clone(),
            aliases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_core::{GrantFragment, LiftError};

    fn manifest(raw: &str) -> AppManifest {
        AppManifest::from_json(raw).unwrap()
    }

    const TWO_TESTS: &str = r#"{
        "resources": [{ "id": "Counter", "kind": "counter" }],
        "tests": [
            { "name": "a", "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc"] }] },
            { "name": "b", "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["peek"] }] }
        ]
    }"#;

    #[test]
    fn test_one_environment_per_test() {
        let app = AppBuilder::new(Target::Sim).build(&manifest(TWO_TESTS)).unwrap();

        assert_eq!(app.test_paths(), vec!["root/env0/test:a", "root/env1/test:b"]);
        assert_eq!(app.resources.len(), 2);
        assert_eq!(app.resources[1].resource.path, "root/env1/Counter");
        assert_eq!(app.runner, "root/cloud.TestRunner");
        assert_eq!(app.tests[0].function, "root/env0/test:a/Handler");
    }

    #[test]
    fn test_no_tests_still_builds_env0() {
        let app = AppBuilder::new(Target::Sim)
            .build(&manifest(r#"{ "resources": [{ "id": "Queue", "kind": "queue" }] }"#))
            .unwrap();
        assert!(app.tests.is_empty());
        assert_eq!(app.resources[0].resource.path, "root/env0/Queue");
    }

    #[test]
    fn test_sim_tables_grant_per_test_handler() {
        let app = AppBuilder::new(Target::Sim).build(&manifest(TWO_TESTS)).unwrap();
        let a = app
            .tables
            .allowed_operations("root/env0/test:a/Handler", "sim://root/env0/Counter");
        assert!(a.contains(&skylift_core::Operation::new("inc")));
        let b = app
            .tables
            .allowed_operations("root/env1/test:b/Handler", "sim://root/env1/Counter");
        assert_eq!(b.len(), 1);
        assert!(b.contains(&skylift_core::Operation::new("peek")));
    }

    #[test]
    fn test_non_sim_targets_render_template() {
        let app = AppBuilder::new(Target::TfAws)
            .root_id("Test.abcdefghij")
            .build(&manifest(TWO_TESTS))
            .unwrap();
        let template = app.template.expect("template");
        assert_eq!(template["target"], "tf-aws");
        let grants = &template["hosts"]["Test.abcdefghij/env0/test:a/Handler"]["grants"];
        let grant: GrantFragment = serde_json::from_value(grants[0].clone()).unwrap();
        assert!(matches!(grant, GrantFragment::AwsPolicyStatement { .. }));
        assert!(app.tables.grants.is_empty());
    }

    #[test]
    fn test_imported_identity_validated() {
        let raw = r#"{
            "resources": [{
                "id": "Secret",
                "kind": "secret",
                "identity": "arn:aws:s3:::not-a-secret"
            }]
        }"#;
        let err = AppBuilder::new(Target::TfAws).build(&manifest(raw)).unwrap_err();
        assert!(matches!(err, SimError::Lift(LiftError::InvalidIdentity { .. })));
        assert!(err.is_construction());
    }

    #[test]
    fn test_website_cannot_take_grants() {
        let raw = r#"{
            "resources": [{ "id": "Counter", "kind": "counter" }],
            "functions": [{
                "id": "Site",
                "host": "website",
                "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc"] }]
            }]
        }"#;
        let err = AppBuilder::new(Target::Sim).build(&manifest(raw)).unwrap_err();
        assert!(matches!(err, SimError::Lift(LiftError::UnsupportedHost { .. })));
    }

    #[test]
    fn test_simfile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let app = AppBuilder::new(Target::Sim).build(&manifest(TWO_TESTS)).unwrap();
        let path = app.write_simfile(dir.path()).unwrap();
        assert_eq!(App::read_simfile(&path).unwrap(), app);
    }
}
