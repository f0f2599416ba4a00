//! Inflight code: handlers and the context they run with.
//!
//! A handler never sees ambient globals. Everything it can reach goes
//! through its [`InflightContext`], which resolves an alias to the
//! environment binding injected at lift time, the binding to a resource
//! identity, and the identity to a running resource.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use skylift_core::{Operation, ResourceKind, SimTables, TraceEvent};

use crate::clients::{
    BucketClient, CounterClient, FunctionClient, QueueClient, ResourceClient, SecretClient,
};
use crate::error::{InflightError, InflightResult, SimError, SimResult};
use crate::manifest::InflightCode;
use crate::resources::Registry;
use crate::script::ScriptHandler;
use crate::tracer::Tracer;

/// Code run by a function when it is invoked.
#[async_trait]
pub trait InflightHandler: Send + Sync {
    async fn handle(&self, ctx: InflightContext, input: Value) -> InflightResult<Value>;
}

#[async_trait]
impl<F, Fut> InflightHandler for F
where
    F: Fn(InflightContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = InflightResult<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: InflightContext, input: Value) -> InflightResult<Value> {
        (self)(ctx, input).await
    }
}

/// Named Rust handlers that manifests can refer to with `"handler": "<name>"`.
#[derive(Clone, Default)]
pub struct Handlers {
    named: HashMap<String, Arc<dyn InflightHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: InflightHandler + 'static,
    {
        self.named.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Handler for `code` declared at `path`: the named handler, or a script.
    pub fn resolve(&self, path: &str, code: &InflightCode) -> SimResult<Arc<dyn InflightHandler>> {
        match &code.handler {
            Some(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| SimError::MissingHandler {
                    name: name.clone(),
                    path: path.to_string(),
                }),
            None => Ok(Arc::new(ScriptHandler::new(code.steps.clone()))),
        }
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.named.keys().collect();
        names.sort();
        f.debug_struct("Handlers").field("named", &names).finish()
    }
}

/// Check that `host` was granted `operation` on `identity`.
pub(crate) fn check_access(
    tables: &SimTables,
    host: &str,
    identity: &str,
    operation: &Operation,
) -> InflightResult<()> {
    if tables.allowed_operations(host, identity).contains(operation) {
        Ok(())
    } else {
        Err(InflightError::AccessDenied {
            host: host.to_string(),
            identity: identity.to_string(),
            operation: operation.clone(),
        })
    }
}

/// Everything a running handler can reach.
#[derive(Clone)]
pub struct InflightContext {
    host: String,
    source_type: &'static str,
    environment: Arc<BTreeMap<String, String>>,
    aliases: Arc<BTreeMap<String, String>>,
    tables: Arc<SimTables>,
    registry: Weak<Registry>,
    tracer: Tracer,
}

impl InflightContext {
    pub(crate) fn new(
        host: impl Into<String>,
        environment: BTreeMap<String, String>,
        aliases: BTreeMap<String, String>,
        tables: Arc<SimTables>,
        registry: Weak<Registry>,
        tracer: Tracer,
    ) -> Self {
        Self {
            host: host.into(),
            source_type: ResourceKind::Function.source_type(),
            environment: Arc::new(environment),
            aliases: Arc::new(aliases),
            tables,
            registry,
            tracer,
        }
    }

    /// Path of the host this code runs in.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Value of an injected environment binding.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }

    pub fn log(&self, message: impl Into<String>) {
        self.tracer
            .emit(TraceEvent::log(&self.host, self.source_type, message));
    }

    pub(crate) fn tables(&self) -> &SimTables {
        &self.tables
    }

    /// Resolve `alias` to a client for the resource lifted under it.
    pub fn resource(&self, alias: &str) -> InflightResult<ResourceClient> {
        let unbound = || InflightError::Unbound {
            alias: alias.to_string(),
            host: self.host.clone(),
        };
        let binding = self.aliases.get(alias).ok_or_else(unbound)?;
        let identity = self.environment.get(binding).ok_or_else(unbound)?;
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| InflightError::NotRunning {
                identity: identity.clone(),
            })?;
        let resource = registry
            .get(identity)
            .ok_or_else(|| InflightError::NotRunning {
                identity: identity.clone(),
            })?;
        Ok(ResourceClient::new(
            self.clone(),
            alias.to_string(),
            identity.clone(),
            resource,
        ))
    }

    fn typed(&self, alias: &str, expected: ResourceKind) -> InflightResult<ResourceClient> {
        let client = self.resource(alias)?;
        if client.kind() != expected {
            return Err(InflightError::KindMismatch {
                alias: alias.to_string(),
                expected,
                actual: client.kind(),
            });
        }
        Ok(client)
    }

    pub fn counter(&self, alias: &str) -> InflightResult<CounterClient> {
        self.typed(alias, ResourceKind::Counter).map(CounterClient::from)
    }

    pub fn queue(&self, alias: &str) -> InflightResult<QueueClient> {
        self.typed(alias, ResourceKind::Queue).map(QueueClient::from)
    }

    pub fn secret(&self, alias: &str) -> InflightResult<SecretClient> {
        self.typed(alias, ResourceKind::Secret).map(SecretClient::from)
    }

    pub fn bucket(&self, alias: &str) -> InflightResult<BucketClient> {
        self.typed(alias, ResourceKind::Bucket).map(BucketClient::from)
    }

    pub fn function(&self, alias: &str) -> InflightResult<FunctionClient> {
        self.typed(alias, ResourceKind::Function).map(FunctionClient::from)
    }

    /// Untyped call, used by scripts.
    pub async fn call(&self, alias: &str, method: &str, args: Value) -> InflightResult<Value> {
        self.resource(alias)?.call(method, args).await
    }
}

impl std::fmt::Debug for InflightContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflightContext")
            .field("host", &self.host)
            .field("aliases", &self.aliases)
            .finish()
    }
}
