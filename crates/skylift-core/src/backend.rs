//! Lift backends: the mechanism that realizes bindings on a target.
//!
//! The binder calls into a backend; it never knows whether the bindings end
//! up in in-memory simulation tables or in a declarative template.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::Operation;
use crate::permissions::GrantFragment;

/// Boundary every target backend implements.
///
/// `attach_grant` receives fragments for the host's current total operation
/// set on each lift. Backends whose authorization model is not additive
/// should deduplicate or replace when they render.
pub trait LiftBackend {
    fn inject_environment(&mut self, host: &str, name: &str, value: &str);
    fn attach_grant(&mut self, host: &str, fragment: &GrantFragment);
    fn add_provisioning_dependency(&mut self, host: &str, resource: &str);
}

/// In-memory tables consumed by the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimTables {
    pub environment: BTreeMap<String, BTreeMap<String, String>>,
    pub grants: BTreeMap<String, Vec<GrantFragment>>,
    /// host -> resources it must start after
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl SimTables {
    pub fn environment_of(&self, host: &str) -> BTreeMap<String, String> {
        self.environment.get(host).cloned().unwrap_or_default()
    }

    pub fn dependencies_of(&self, host: &str) -> BTreeSet<String> {
        self.dependencies.get(host).cloned().unwrap_or_default()
    }

    /// Union of operations granted to `host` on the resource `identity`.
    pub fn allowed_operations(&self, host: &str, identity: &str) -> BTreeSet<Operation> {
        let mut allowed = BTreeSet::new();
        for grant in self.grants.get(host).into_iter().flatten() {
            if let GrantFragment::SimAccess {
                identity: granted,
                operations,
            } = grant
            {
                if granted == identity {
                    allowed.extend(operations.iter().cloned());
                }
            }
        }
        allowed
    }
}

/// Backend that records bindings into [`SimTables`].
#[derive(Debug, Default)]
pub struct SimBackend {
    tables: SimTables,
}

impl SimBackend {
    pub fn tables(&self) -> &SimTables {
        &self.tables
    }

    pub fn into_tables(self) -> SimTables {
        self.tables
    }
}

impl LiftBackend for SimBackend {
    fn inject_environment(&mut self, host: &str, name: &str, value: &str) {
        self.tables
            .environment
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    fn attach_grant(&mut self, host: &str, fragment: &GrantFragment) {
        self.tables
            .grants
            .entry(host.to_string())
            .or_default()
            .push(fragment.clone());
    }

    fn add_provisioning_dependency(&mut self, host: &str, resource: &str) {
        self.tables
            .dependencies
            .entry(host.to_string())
            .or_default()
            .insert(resource.to_string());
    }
}

/// One host in a rendered template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateHost {
    pub environment: BTreeMap<String, String>,
    pub grants: Vec<GrantFragment>,
    pub depends_on: BTreeSet<String>,
}

/// Backend producing a declarative infrastructure template.
///
/// Grants are deduplicated, so a host lifted repeatedly for growing operation
/// sets keeps one fragment per distinct grant.
#[derive(Debug, Default)]
pub struct TemplateBackend {
    target: String,
    hosts: BTreeMap<String, TemplateHost>,
}

impl TemplateBackend {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            hosts: BTreeMap::new(),
        }
    }

    pub fn hosts(&self) -> &BTreeMap<String, TemplateHost> {
        &self.hosts
    }

    /// Render the template as JSON.
    pub fn render(&self) -> serde_json::Value {
        serde_json::json!({
            "target": self.target,
            "hosts": self.hosts,
        })
    }
}

impl LiftBackend for TemplateBackend {
    fn inject_environment(&mut self, host: &str, name: &str, value: &str) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .environment
            .insert(name.to_string(), value.to_string());
    }

    fn attach_grant(&mut self, host: &str, fragment: &GrantFragment) {
        let entry = self.hosts.entry(host.to_string()).or_default();
        if !entry.grants.contains(fragment) {
            entry.grants.push(fragment.clone());
        }
    }

    fn add_provisioning_dependency(&mut self, host: &str, resource: &str) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .depends_on
            .insert(resource.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_tables_union_access() {
        let mut backend = SimBackend::default();
        backend.attach_grant(
            "fn",
            &GrantFragment::SimAccess {
                identity: "sim://q".into(),
                operations: vec![Operation::new("approx_size")],
            },
        );
        backend.attach_grant(
            "fn",
            &GrantFragment::SimAccess {
                identity: "sim://q".into(),
                operations: vec![Operation::new("push")],
            },
        );
        backend.attach_grant(
            "fn",
            &GrantFragment::SimAccess {
                identity: "sim://other".into(),
                operations: vec![Operation::new("purge")],
            },
        );

        let allowed = backend.tables().allowed_operations("fn", "sim://q");
        assert_eq!(allowed.len(), 2);
        assert!(allowed.contains(&Operation::new("push")));
        assert!(!allowed.contains(&Operation::new("purge")));
        assert!(backend.tables().allowed_operations("nobody", "sim://q").is_empty());
    }

    #[test]
    fn test_template_dedupes_grants() {
        let grant = GrantFragment::AwsPolicyStatement {
            effect: "Allow".into(),
            actions: vec!["sqs:SendMessage".into()],
            resources: vec!["arn:aws:sqs:us-east-1:0:q".into()],
        };
        let mut backend = TemplateBackend::new("tf-aws");
        backend.attach_grant("fn", &grant);
        backend.attach_grant("fn", &grant);
        backend.add_provisioning_dependency("fn", "q");
        backend.inject_environment("fn", "QUEUE_ABC", "arn");

        let rendered = backend.render();
        assert_eq!(rendered["target"], "tf-aws");
        assert_eq!(rendered["hosts"]["fn"]["grants"].as_array().unwrap().len(), 1);
        assert_eq!(rendered["hosts"]["fn"]["depends_on"][0], "q");
        assert_eq!(rendered["hosts"]["fn"]["environment"]["QUEUE_ABC"], "arn");
    }
}
