//! Lifting: binding a declared resource onto an inflight host.
//!
//! A lift produces, on the host:
//! - one environment binding per identity concept the resource exposes,
//! - grant fragments for the *total* operation set requested so far,
//! - a provisioning dependency from the host to the resource.
//!
//! The per-host state lives in a [`HostBindings`] accumulator that only
//! [`LiftBinder::lift`] mutates, so the merge-by-union rule is enforced in a
//! single place. The mechanism that realizes the bindings on a target is a
//! [`LiftBackend`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::LiftBackend;
use crate::domain::{HostKind, LiftError, Operation, Resource, Result, Target};
use crate::permissions::{compute_grant, required_access, GrantFragment};

/// Default number of hex characters kept from the path hash in binding names.
///
/// 12 hex characters (48 bits) keep collisions negligible for graphs with
/// tens of thousands of resources.
pub const DEFAULT_ENV_SUFFIX_LEN: usize = 12;

/// Tunables for binding-name derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftConfig {
    /// Hex characters of the path hash appended to binding names.
    pub env_suffix_len: usize,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            env_suffix_len: DEFAULT_ENV_SUFFIX_LEN,
        }
    }
}

/// Derive the environment binding name for a resource path.
///
/// Deterministic: the same `(prefix, path, suffix_len)` always yields the same
/// name. Uniqueness across paths is probabilistic and scales with
/// `suffix_len`.
pub fn env_binding_name(prefix: &str, path: &str, suffix_len: usize) -> String {
    let digest = hex::encode(Sha256::digest(path.as_bytes()));
    let len = suffix_len.clamp(1, digest.len());
    format!("{}_{}", prefix, &digest[digest.len() - len..]).to_uppercase()
}

/// A single `name=value` binding exposed to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvBinding {
    pub name: String,
    pub value: String,
}

/// Resource-side capability: something that can be lifted onto a host.
pub trait Liftable {
    fn resource(&self) -> &Resource;

    /// Bindings exposing the resource's identity.
    fn env_bindings(&self, config: &LiftConfig) -> Result<Vec<EnvBinding>> {
        let res = self.resource();
        Ok(vec![EnvBinding {
            name: env_binding_name(res.kind.env_prefix(), &res.path, config.env_suffix_len),
            value: res.identity.to_string(),
        }])
    }

    /// Grants for the total operation set requested by a host.
    fn grants(&self, operations: &BTreeSet<Operation>, target: Target) -> Result<Vec<GrantFragment>> {
        Ok(compute_grant(self.resource(), operations, target)?
            .into_iter()
            .collect())
    }

    /// Whether this resource can be lifted onto a host of `kind` at all.
    fn supports_host(&self, _kind: HostKind) -> bool {
        true
    }
}

impl Liftable for Resource {
    fn resource(&self) -> &Resource {
        self
    }
}

/// Host-side capability: an execution environment resources are lifted onto.
pub trait InflightHost {
    fn host_path(&self) -> &str;
    fn host_kind(&self) -> HostKind;
}

/// Accumulated lift state of one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostBindings {
    path: String,
    kind: HostKind,
    environment: BTreeMap<String, String>,
    grants: Vec<GrantFragment>,
    operations: BTreeMap<String, BTreeSet<Operation>>,
    dependencies: BTreeSet<String>,
}

impl HostBindings {
    pub fn for_host(host: &dyn InflightHost) -> Self {
        Self::new(host.host_path(), host.host_kind())
    }

    pub fn new(path: impl Into<String>, kind: HostKind) -> Self {
        Self {
            path: path.into(),
            kind,
            environment: BTreeMap::new(),
            grants: Vec::new(),
            operations: BTreeMap::new(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Grant fragments in the order they were attached (may repeat).
    pub fn grants(&self) -> &[GrantFragment] {
        &self.grants
    }

    /// Grant fragments with duplicates removed, first occurrence kept.
    pub fn unique_grants(&self) -> Vec<GrantFragment> {
        let mut seen = std::collections::HashSet::new();
        self.grants
            .iter()
            .filter(|g| seen.insert((*g).clone()))
            .cloned()
            .collect()
    }

    /// Operations requested so far for the resource at `resource_path`.
    pub fn operations_for(&self, resource_path: &str) -> BTreeSet<Operation> {
        self.operations
            .get(resource_path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }
}

impl InflightHost for HostBindings {
    fn host_path(&self) -> &str {
        &self.path
    }

    fn host_kind(&self) -> HostKind {
        self.kind
    }
}

/// Applies lifts for one target through a backend.
pub struct LiftBinder<'b> {
    target: Target,
    config: LiftConfig,
    backend: &'b mut dyn LiftBackend,
}

impl<'b> LiftBinder<'b> {
    pub fn new(target: Target, config: LiftConfig, backend: &'b mut dyn LiftBackend) -> Self {
        Self {
            target,
            config,
            backend,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn config(&self) -> &LiftConfig {
        &self.config
    }

    /// Lift `resource` onto `host` for `operations`.
    ///
    /// Operations accumulate per (resource, host): lifting `{a}` then `{b}`
    /// leaves the host with the grant for `{a, b}`. Repeated lifts reuse the
    /// same binding names. Nothing on the host changes if the lift fails.
    pub fn lift<I>(&mut self, resource: &dyn Liftable, host: &mut HostBindings, operations: I) -> Result<()>
    where
        I: IntoIterator<Item = Operation>,
    {
        let res = resource.resource();

        if !resource.supports_host(host.kind) {
            return Err(self.unsupported(res, host, "resource cannot be used from this host kind"));
        }

        let mut merged = host.operations_for(&res.path);
        merged.extend(operations);
        required_access(res.kind, &merged)?;

        let grants = resource.grants(&merged, self.target)?;
        if !grants.is_empty() && !host.kind.accepts_grants() {
            return Err(self.unsupported(res, host, "host cannot accept grants"));
        }

        let bindings = resource.env_bindings(&self.config)?;
        for binding in &bindings {
            if let Some(existing) = host.environment.get(&binding.name) {
                if existing != &binding.value {
                    return Err(LiftError::BindingCollision {
                        name: binding.name.clone(),
                        host: host.path.clone(),
                    });
                }
            }
        }

        for binding in bindings {
            self.bind_environment(host, &binding.name, &binding.value)?;
        }
        self.attach_grants(host, grants);
        host.operations.insert(res.path.clone(), merged);
        self.depend(host, &res.path);

        debug!(
            resource = %res.path,
            host = %host.path,
            ops = ?host.operations_for(&res.path),
            "lifted resource"
        );
        Ok(())
    }

    /// Bind `name=value` on `host`. Re-binding the same value is a no-op.
    pub fn bind_environment(&mut self, host: &mut HostBindings, name: &str, value: &str) -> Result<()> {
        match host.environment.get(name) {
            Some(existing) if existing == value => Ok(()),
            Some(_) => Err(LiftError::BindingCollision {
                name: name.to_string(),
                host: host.path.clone(),
            }),
            None => {
                host.environment.insert(name.to_string(), value.to_string());
                self.backend.inject_environment(&host.path, name, value);
                Ok(())
            }
        }
    }

    /// Append grant fragments to `host`.
    pub fn attach_grants(&mut self, host: &mut HostBindings, grants: Vec<GrantFragment>) {
        for grant in grants {
            self.backend.attach_grant(&host.path, &grant);
            host.grants.push(grant);
        }
    }

    /// Record that `host` must be provisioned after `resource_path`.
    pub fn depend(&mut self, host: &mut HostBindings, resource_path: &str) {
        if host.path == resource_path {
            return;
        }
        if host.dependencies.insert(resource_path.to_string()) {
            self.backend
                .add_provisioning_dependency(&host.path, resource_path);
        }
    }

    fn unsupported(&self, res: &Resource, host: &HostBindings, reason: &str) -> LiftError {
        LiftError::UnsupportedHost {
            resource: res.path.clone(),
            kind: res.kind,
            host: host.path.clone(),
            host_kind: host.kind,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimBackend;
    use crate::domain::ResourceKind;

    #[test]
    fn test_env_binding_name_shape() {
        let name = env_binding_name("SECRET", "root/env0/Secret", 8);
        assert!(name.starts_with("SECRET_"));
        assert_eq!(name.len(), "SECRET_".len() + 8);
        assert_eq!(name, name.to_uppercase());
    }

    #[test]
    fn test_env_binding_name_suffix_len_is_clamped() {
        let name = env_binding_name("QUEUE", "root/env0/Queue", 500);
        assert_eq!(name.len(), "QUEUE_".len() + 64);
        let name = env_binding_name("QUEUE", "root/env0/Queue", 0);
        assert_eq!(name.len(), "QUEUE_".len() + 1);
    }

    #[test]
    fn test_failed_lift_leaves_host_untouched() {
        let mut backend = SimBackend::default();
        let mut binder = LiftBinder::new(Target::Sim, LiftConfig::default(), &mut backend);
        let queue = Resource::managed("root/env0/Queue", ResourceKind::Queue, Target::Sim);
        let mut host = HostBindings::new("root/env0/Function", HostKind::Function);

        let err = binder
            .lift(&queue, &mut host, [Operation::new("explode")])
            .unwrap_err();
        assert!(matches!(err, LiftError::UnknownOperation { .. }));
        assert!(host.environment().is_empty());
        assert!(host.grants().is_empty());
        assert!(host.dependencies().is_empty());
    }

    #[test]
    fn test_website_rejects_grants() {
        let mut backend = SimBackend::default();
        let mut binder = LiftBinder::new(Target::Sim, LiftConfig::default(), &mut backend);
        let counter = Resource::managed("root/env0/Counter", ResourceKind::Counter, Target::Sim);
        let mut site = HostBindings::new("root/env0/Website", HostKind::Website);

        let err = binder
            .lift(&counter, &mut site, [Operation::new("inc")])
            .unwrap_err();
        assert!(matches!(err, LiftError::UnsupportedHost { .. }));

        // identity-only lifts need no grant and are fine
        binder
            .lift(&counter, &mut site, std::iter::empty::<Operation>())
            .expect("identity-only lift");
        assert_eq!(site.environment().len(), 1);
    }

    #[test]
    fn test_binding_collision_detected() {
        let mut backend = SimBackend::default();
        let mut binder = LiftBinder::new(Target::Sim, LiftConfig::default(), &mut backend);
        let mut host = HostBindings::new("root/env0/Function", HostKind::Function);
        binder.bind_environment(&mut host, "X", "1").unwrap();
        binder.bind_environment(&mut host, "X", "1").unwrap();
        assert!(matches!(
            binder.bind_environment(&mut host, "X", "2"),
            Err(LiftError::BindingCollision { .. })
        ));
    }
}
