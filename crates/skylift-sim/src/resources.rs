//! Simulated resources.
//!
//! Each resource keeps its runtime state behind a tokio mutex, emits a
//! verbose trace per operation, and can hand its state to the simulator on
//! stop so the next start resumes from it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use skylift_core::{LogLevel, Operation, ResourceKind, SimTables, TestResult, TraceEvent, TraceType};

use crate::error::{InflightError, InflightResult};
use crate::inflight::{check_access, InflightContext, InflightHandler};
use crate::tracer::Tracer;

/// A live resource inside a running simulator.
#[async_trait]
pub trait SimResource: Send + Sync {
    fn path(&self) -> &str;
    fn kind(&self) -> ResourceKind;

    /// Create runtime state, from `saved` when a previous run persisted some.
    async fn init(&self, saved: Option<Value>) -> Result<(), String>;

    async fn call(&self, caller: &str, operation: &Operation, args: Value) -> InflightResult<Value>;

    /// State to persist across stop/start, if any.
    async fn save(&self) -> Option<Value>;

    async fn cleanup(&self) -> Result<(), String>;
}

/// Running resources by identity.
#[derive(Default)]
pub struct Registry {
    by_identity: HashMap<String, Arc<dyn SimResource>>,
}

impl Registry {
    pub fn insert(&mut self, identity: impl Into<String>, resource: Arc<dyn SimResource>) {
        self.by_identity.insert(identity.into(), resource);
    }

    pub fn get(&self, identity: &str) -> Option<Arc<dyn SimResource>> {
        self.by_identity.get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

fn unsupported(path: &str, operation: &Operation) -> InflightError {
    InflightError::Unsupported {
        resource: path.to_string(),
        operation: operation.to_string(),
    }
}

fn invalid(operation: &Operation, reason: impl Into<String>) -> InflightError {
    InflightError::InvalidArgument {
        operation: operation.clone(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

pub struct CounterSim {
    path: String,
    initial: Value,
    value: Mutex<i64>,
    tracer: Tracer,
}

impl CounterSim {
    pub fn new(path: impl Into<String>, initial: Value, tracer: Tracer) -> Self {
        Self {
            path: path.into(),
            initial,
            value: Mutex::new(0),
            tracer,
        }
    }

    fn trace(&self, message: String) {
        self.tracer
            .emit(TraceEvent::resource(&self.path, "cloud.Counter", message));
    }
}

#[async_trait]
impl SimResource for CounterSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Counter
    }

    async fn init(&self, saved: Option<Value>) -> Result<(), String> {
        let start = match saved.as_ref().unwrap_or(&self.initial) {
            Value::Null => 0,
            value => value
                .as_i64()
                .ok_or_else(|| format!("initial value must be an integer, got {value}"))?,
        };
        *self.value.lock().await = start;
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        let mut value = self.value.lock().await;
        match operation.as_str() {
            "peek" => {
                self.trace(format!("Peek (value={})", *value));
                Ok(json!(*value))
            }
            "inc" | "dec" => {
                let amount = match args {
                    Value::Null => 1,
                    other => other
                        .as_i64()
                        .ok_or_else(|| invalid(operation, "amount must be an integer"))?,
                };
                let prev = *value;
                *value = if operation.as_str() == "inc" {
                    prev + amount
                } else {
                    prev - amount
                };
                self.trace(format!("{} (amount={amount})", capitalize(operation.as_str())));
                Ok(json!(prev))
            }
            "set" => {
                let next = args
                    .as_i64()
                    .ok_or_else(|| invalid(operation, "value must be an integer"))?;
                *value = next;
                self.trace(format!("Set (value={next})"));
                Ok(Value::Null)
            }
            _ => Err(unsupported(&self.path, operation)),
        }
    }

    async fn save(&self) -> Option<Value> {
        Some(json!(*self.value.lock().await))
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

pub struct QueueSim {
    path: String,
    initial: Value,
    messages: Mutex<VecDeque<String>>,
    tracer: Tracer,
}

impl QueueSim {
    pub fn new(path: impl Into<String>, initial: Value, tracer: Tracer) -> Self {
        Self {
            path: path.into(),
            initial,
            messages: Mutex::new(VecDeque::new()),
            tracer,
        }
    }
}

fn message_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl SimResource for QueueSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Queue
    }

    async fn init(&self, saved: Option<Value>) -> Result<(), String> {
        let messages = match saved.as_ref().unwrap_or(&self.initial) {
            Value::Null => VecDeque::new(),
            Value::Array(items) => items.iter().cloned().map(message_text).collect(),
            other => return Err(format!("initial messages must be an array, got {other}")),
        };
        *self.messages.lock().await = messages;
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        let mut messages = self.messages.lock().await;
        let out = match operation.as_str() {
            "push" => {
                let batch: Vec<String> = match args {
                    Value::Array(items) => items.into_iter().map(message_text).collect(),
                    Value::Null => return Err(invalid(operation, "nothing to push")),
                    other => vec![message_text(other)],
                };
                let count = batch.len();
                messages.extend(batch);
                self.tracer.emit(TraceEvent::resource(
                    &self.path,
                    "cloud.Queue",
                    format!("Push (messages={count})"),
                ));
                Value::Null
            }
            "pop" => {
                let popped = messages.pop_front();
                self.tracer
                    .emit(TraceEvent::resource(&self.path, "cloud.Queue", "Pop"));
                popped.map(Value::String).unwrap_or(Value::Null)
            }
            "approx_size" => json!(messages.len()),
            "purge" => {
                messages.clear();
                self.tracer
                    .emit(TraceEvent::resource(&self.path, "cloud.Queue", "Purge"));
                Value::Null
            }
            _ => return Err(unsupported(&self.path, operation)),
        };
        Ok(out)
    }

    async fn save(&self) -> Option<Value> {
        Some(json!(*self.messages.lock().await))
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

pub struct SecretSim {
    path: String,
    value: String,
    tracer: Tracer,
}

impl SecretSim {
    pub fn new(path: impl Into<String>, initial: Value, tracer: Tracer) -> Self {
        Self {
            path: path.into(),
            value: match initial {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            },
            tracer,
        }
    }
}

#[async_trait]
impl SimResource for SecretSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }

    async fn init(&self, _saved: Option<Value>) -> Result<(), String> {
        if self.value.is_empty() {
            return Err("secret has no value".to_string());
        }
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, _args: Value) -> InflightResult<Value> {
        self.tracer
            .emit(TraceEvent::resource(&self.path, "cloud.Secret", "Get value"));
        match operation.as_str() {
            "value" => Ok(Value::String(self.value.clone())),
            "value_json" => serde_json::from_str(&self.value)
                .map_err(|e| InflightError::failed(format!("secret is not valid JSON: {e}"))),
            _ => Err(unsupported(&self.path, operation)),
        }
    }

    async fn save(&self) -> Option<Value> {
        None
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

pub struct BucketSim {
    path: String,
    initial: Value,
    objects: Mutex<BTreeMap<String, String>>,
    tracer: Tracer,
}

impl BucketSim {
    pub fn new(path: impl Into<String>, initial: Value, tracer: Tracer) -> Self {
        Self {
            path: path.into(),
            initial,
            objects: Mutex::new(BTreeMap::new()),
            tracer,
        }
    }
}

fn key_arg(operation: &Operation, args: &Value) -> InflightResult<String> {
    args.as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(operation, "expected an object key"))
}

#[async_trait]
impl SimResource for BucketSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    async fn init(&self, saved: Option<Value>) -> Result<(), String> {
        let objects = match saved.as_ref().unwrap_or(&self.initial) {
            Value::Null => BTreeMap::new(),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), message_text(v.clone())))
                .collect(),
            other => return Err(format!("initial objects must be a map, got {other}")),
        };
        *self.objects.lock().await = objects;
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        let mut objects = self.objects.lock().await;
        let trace = |message: String| {
            self.tracer
                .emit(TraceEvent::resource(&self.path, "cloud.Bucket", message))
        };
        match operation.as_str() {
            "get" => {
                let key = key_arg(operation, &args)?;
                trace(format!("Get (key={key})"));
                objects
                    .get(&key)
                    .cloned()
                    .map(Value::String)
                    .ok_or_else(|| InflightError::failed(format!("Object does not exist (key={key})")))
            }
            "exists" => {
                let key = key_arg(operation, &args)?;
                Ok(Value::Bool(objects.contains_key(&key)))
            }
            "list" => {
                let prefix = args.as_str().unwrap_or("");
                trace("List".to_string());
                Ok(json!(objects
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .collect::<Vec<_>>()))
            }
            "put" => {
                let key = args
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(operation, "missing \"key\""))?
                    .to_string();
                let body = args.get("value").cloned().unwrap_or(Value::Null);
                trace(format!("Put (key={key})"));
                objects.insert(key, message_text(body));
                Ok(Value::Null)
            }
            "delete" => {
                let key = key_arg(operation, &args)?;
                trace(format!("Delete (key={key})"));
                objects.remove(&key);
                Ok(Value::Null)
            }
            _ => Err(unsupported(&self.path, operation)),
        }
    }

    async fn save(&self) -> Option<Value> {
        Some(json!(*self.objects.lock().await))
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

pub struct FunctionSim {
    path: String,
    handler: Arc<dyn InflightHandler>,
    ctx: InflightContext,
    tracer: Tracer,
}

impl FunctionSim {
    pub fn new(
        path: impl Into<String>,
        handler: Arc<dyn InflightHandler>,
        ctx: InflightContext,
        tracer: Tracer,
    ) -> Self {
        Self {
            path: path.into(),
            handler,
            ctx,
            tracer,
        }
    }
}

#[async_trait]
impl SimResource for FunctionSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    async fn init(&self, _saved: Option<Value>) -> Result<(), String> {
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        match operation.as_str() {
            "invoke" => {
                self.tracer.emit(TraceEvent::resource(
                    &self.path,
                    "cloud.Function",
                    format!("Invoke (payload={args})"),
                ));
                self.handler.handle(self.ctx.clone(), args).await
            }
            "invoke_async" => {
                self.tracer.emit(TraceEvent::resource(
                    &self.path,
                    "cloud.Function",
                    format!("InvokeAsync (payload={args})"),
                ));
                if let Err(e) = self.handler.handle(self.ctx.clone(), args).await {
                    self.tracer.emit(
                        TraceEvent::log(&self.path, "cloud.Function", "invocation failed")
                            .with_error(e.to_string()),
                    );
                }
                Ok(Value::Null)
            }
            _ => Err(unsupported(&self.path, operation)),
        }
    }

    async fn save(&self) -> Option<Value> {
        None
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test runner
// ---------------------------------------------------------------------------

/// Runs tests by invoking the function registered for each test path.
pub struct TestRunnerSim {
    path: String,
    tests: Vec<(String, String)>,
    tables: Arc<SimTables>,
    registry: Weak<Registry>,
    tracer: Tracer,
}

impl TestRunnerSim {
    pub fn new(
        path: impl Into<String>,
        tests: Vec<(String, String)>,
        tables: Arc<SimTables>,
        registry: Weak<Registry>,
        tracer: Tracer,
    ) -> Self {
        Self {
            path: path.into(),
            tests,
            tables,
            registry,
            tracer,
        }
    }

    pub fn list_tests(&self) -> Vec<String> {
        self.tests.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Run the test at `test_path`, capturing the traces it emits.
    pub async fn run_test(&self, test_path: &str) -> TestResult {
        self.tracer.begin_capture();
        let outcome = self.invoke(test_path).await;
        if let Err(e) = &outcome {
            self.tracer.emit(
                TraceEvent::new(
                    test_path,
                    "cloud.TestRunner",
                    TraceType::Log,
                    LogLevel::Error,
                    e.to_string(),
                )
                .with_error(e.to_string()),
            );
        }
        let traces = self.tracer.end_capture();

        match outcome {
            Ok(_) => TestResult::passed(test_path, traces),
            Err(InflightError::Unsupported {
                resource,
                operation,
            }) => {
                let message = format!("{resource} does not support {operation} on this target");
                TestResult::unsupported(test_path, message, resource, operation, traces)
            }
            Err(e) => TestResult::failed(test_path, e.to_string(), traces),
        }
    }

    async fn invoke(&self, test_path: &str) -> InflightResult<Value> {
        let identity = self
            .tests
            .iter()
            .find(|(path, _)| path == test_path)
            .map(|(_, identity)| identity.clone())
            .ok_or_else(|| InflightError::failed(format!("no test at {test_path}")))?;
        let invoke = Operation::new("invoke");
        check_access(&self.tables, &self.path, &identity, &invoke)?;

        let function = self
            .registry
            .upgrade()
            .and_then(|registry| registry.get(&identity))
            .ok_or_else(|| InflightError::NotRunning {
                identity: identity.clone(),
            })?;
        function.call(&self.path, &invoke, Value::Null).await
    }
}

#[async_trait]
impl SimResource for TestRunnerSim {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::TestRunner
    }

    async fn init(&self, _saved: Option<Value>) -> Result<(), String> {
        Ok(())
    }

    async fn call(&self, _caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        match operation.as_str() {
            "list_tests" => Ok(json!(self.list_tests())),
            "run_test" => {
                let path = args
                    .as_str()
                    .ok_or_else(|| invalid(operation, "expected a test path"))?;
                let result = self.run_test(path).await;
                serde_json::to_value(result).map_err(|e| InflightError::failed(e.to_string()))
            }
            _ => Err(unsupported(&self.path, operation)),
        }
    }

    async fn save(&self) -> Option<Value> {
        None
    }

    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Teardown fault
// ---------------------------------------------------------------------------

/// Delegates to `inner`, then reports `error` from cleanup.
pub struct FailingCleanup {
    inner: Arc<dyn SimResource>,
    error: String,
}

impl FailingCleanup {
    pub fn new(inner: Arc<dyn SimResource>, error: impl Into<String>) -> Self {
        Self {
            inner,
            error: error.into(),
        }
    }
}

#[async_trait]
impl SimResource for FailingCleanup {
    fn path(&self) -> &str {
        self.inner.path()
    }

    fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    async fn init(&self, saved: Option<Value>) -> Result<(), String> {
        self.inner.init(saved).await
    }

    async fn call(&self, caller: &str, operation: &Operation, args: Value) -> InflightResult<Value> {
        self.inner.call(caller, operation, args).await
    }

    async fn save(&self) -> Option<Value> {
        self.inner.save().await
    }

    async fn cleanup(&self) -> Result<(), String> {
        self.inner.cleanup().await?;
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_inc_returns_previous_value() {
        let counter = CounterSim::new("root/env0/Counter", json!(5), Tracer::new());
        counter.init(None).await.unwrap();
        let prev = counter
            .call("fn", &Operation::new("inc"), Value::Null)
            .await
            .unwrap();
        assert_eq!(prev, json!(5));
        assert_eq!(counter.save().await, Some(json!(6)));
    }

    #[tokio::test]
    async fn test_counter_resumes_from_saved_state() {
        let counter = CounterSim::new("root/env0/Counter", json!(0), Tracer::new());
        counter.init(Some(json!(41))).await.unwrap();
        let peek = counter
            .call("fn", &Operation::new("peek"), Value::Null)
            .await
            .unwrap();
        assert_eq!(peek, json!(41));
    }

    #[tokio::test]
    async fn test_counter_rejects_non_integer_initial() {
        let counter = CounterSim::new("root/env0/Counter", json!("zero"), Tracer::new());
        assert!(counter.init(None).await.is_err());
    }

    #[tokio::test]
    async fn test_queue_fifo() {
        let queue = QueueSim::new("root/env0/Queue", Value::Null, Tracer::new());
        queue.init(None).await.unwrap();
        queue
            .call("fn", &Operation::new("push"), json!(["a", "b"]))
            .await
            .unwrap();
        let pop = Operation::new("pop");
        assert_eq!(queue.call("fn", &pop, Value::Null).await.unwrap(), json!("a"));
        assert_eq!(queue.call("fn", &pop, Value::Null).await.unwrap(), json!("b"));
        assert_eq!(queue.call("fn", &pop, Value::Null).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_bucket_get_missing_object_fails() {
        let bucket = BucketSim::new("root/env0/Bucket", json!({ "a.txt": "hi" }), Tracer::new());
        bucket.init(None).await.unwrap();
        let get = Operation::new("get");
        assert_eq!(bucket.call("fn", &get, json!("a.txt")).await.unwrap(), json!("hi"));
        let err = bucket.call("fn", &get, json!("b.txt")).await.unwrap_err();
        assert!(err.to_string().contains("b.txt"));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_unsupported() {
        let secret = SecretSim::new("root/env0/Secret", json!("s3cr3t"), Tracer::new());
        secret.init(None).await.unwrap();
        let err = secret
            .call("fn", &Operation::new("rotate"), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, InflightError::Unsupported { .. }));
    }
}
