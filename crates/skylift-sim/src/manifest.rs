//! Application manifests: the declared resource graph of one test file.
//!
//! A manifest is plain JSON:
//!
//! ```json
//! {
//!   "resources": [{ "id": "Counter", "kind": "counter", "initial": 0 }],
//!   "functions": [],
//!   "tests": [{
//!     "name": "increments",
//!     "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc", "peek"] }],
//!     "steps": [
//!       { "do": "call", "binding": "c", "method": "inc" },
//!       { "do": "call", "binding": "c", "method": "peek", "expect": 1 }
//!     ]
//!   }]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use skylift_core::{HostKind, Operation, ResourceKind};

use crate::error::{SimError, SimResult};

/// One instruction of a declarative inflight script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Step {
    Log {
        message: String,
    },
    /// Suspend for `ms` milliseconds.
    Sleep {
        ms: u64,
    },
    /// Call `method` on the resource lifted under `binding`.
    Call {
        binding: String,
        method: String,
        #[serde(default)]
        args: Value,
        /// Fail the script unless the call returns this value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<Value>,
    },
    Fail {
        message: String,
    },
    /// Signal that the current target lacks a feature.
    Unsupported {
        resource: String,
        operation: String,
    },
}

/// Inflight code: either a script or the name of a registered handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InflightCode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

/// A resource (or function) made available to inflight code under `alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftDecl {
    pub alias: String,
    /// Id of a declared resource or function.
    pub resource: String,
    #[serde(default)]
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub id: String,
    pub kind: ResourceKind,
    /// Initial state: a counter's value, a secret's value, a bucket's objects.
    #[serde(default)]
    pub initial: Value,
    /// Identity of an existing resource; absent for managed resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Make the simulator's teardown of this resource fail with this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

fn default_host_kind() -> HostKind {
    HostKind::Function
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub id: String,
    #[serde(default = "default_host_kind")]
    pub host: HostKind,
    #[serde(default)]
    pub lifts: Vec<LiftDecl>,
    #[serde(flatten)]
    pub code: InflightCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDecl {
    pub name: String,
    #[serde(default)]
    pub lifts: Vec<LiftDecl>,
    #[serde(flatten)]
    pub code: InflightCode,
}

/// The declared application of one test file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub tests: Vec<TestDecl>,
}

impl AppManifest {
    pub fn from_json(raw: &str) -> SimResult<Self> {
        let manifest: AppManifest =
            serde_json::from_str(raw).map_err(|e| SimError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Check ids, names and lift references.
    pub fn validate(&self) -> SimResult<()> {
        let mut ids = HashSet::new();
        for decl in &self.resources {
            check_id(&decl.id)?;
            if matches!(decl.kind, ResourceKind::Function | ResourceKind::TestRunner) {
                return Err(SimError::Manifest(format!(
                    "resource {} has kind {}; declare functions under \"functions\"",
                    decl.id, decl.kind
                )));
            }
            if !ids.insert(decl.id.as_str()) {
                return Err(SimError::Manifest(format!("duplicate id {}", decl.id)));
            }
        }
        for decl in &self.functions {
            check_id(&decl.id)?;
            if !ids.insert(decl.id.as_str()) {
                return Err(SimError::Manifest(format!("duplicate id {}", decl.id)));
            }
        }

        let mut names = HashSet::new();
        for test in &self.tests {
            if test.name.is_empty() || test.name.contains('/') {
                return Err(SimError::Manifest(format!(
                    "invalid test name \"{}\"",
                    test.name
                )));
            }
            if !names.insert(test.name.as_str()) {
                return Err(SimError::Manifest(format!("duplicate test {}", test.name)));
            }
        }

        let lifts = self
            .functions
            .iter()
            .map(|f| (f.id.as_str(), &f.lifts, &f.code))
            .chain(self.tests.iter().map(|t| (t.name.as_str(), &t.lifts, &t.code)));
        for (owner, lifts, code) in lifts {
            if !code.steps.is_empty() && code.handler.is_some() {
                return Err(SimError::Manifest(format!(
                    "{owner} declares both steps and a handler"
                )));
            }
            let mut aliases = HashSet::new();
            for lift in lifts.iter() {
                if !ids.contains(lift.resource.as_str()) {
                    return Err(SimError::Manifest(format!(
                        "{owner} lifts unknown resource {}",
                        lift.resource
                    )));
                }
                if !aliases.insert(lift.alias.as_str()) {
                    return Err(SimError::Manifest(format!(
                        "{owner} uses alias {} twice",
                        lift.alias
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_id(id: &str) -> SimResult<()> {
    if id.is_empty() || id.contains('/') || id.starts_with("test:") {
        return Err(SimError::Manifest(format!("invalid id \"{id}\"")));
    }
    Ok(())
}
