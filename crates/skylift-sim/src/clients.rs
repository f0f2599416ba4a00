//! Typed inflight clients.

use std::sync::Arc;

use serde_json::{json, Value};

use skylift_core::{Operation, ResourceKind};

use crate::error::{InflightError, InflightResult};
use crate::inflight::{check_access, InflightContext};
use crate::resources::SimResource;

/// Untyped client bound to one resource and the host calling it.
#[derive(Clone)]
pub struct ResourceClient {
    ctx: InflightContext,
    alias: String,
    identity: String,
    resource: Arc<dyn SimResource>,
}

impl ResourceClient {
    pub(crate) fn new(
        ctx: InflightContext,
        alias: String,
        identity: String,
        resource: Arc<dyn SimResource>,
    ) -> Self {
        Self {
            ctx,
            alias,
            identity,
            resource,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Call `method`, subject to the host's grants.
    pub async fn call(&self, method: &str, args: Value) -> InflightResult<Value> {
        let operation = Operation::new(method);
        check_access(self.ctx.tables(), self.ctx.host(), &self.identity, &operation)?;
        self.resource.call(self.ctx.host(), &operation, args).await
    }
}

fn as_i64(operation: &str, value: Value) -> InflightResult<i64> {
    value.as_i64().ok_or_else(|| InflightError::InvalidArgument {
        operation: Operation::new(operation),
        reason: format!("expected an integer, got {value}"),
    })
}

fn as_string(operation: &str, value: Value) -> InflightResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(InflightError::InvalidArgument {
            operation: Operation::new(operation),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

macro_rules! typed_client {
    ($name:ident) => {
        #[derive(Clone)]
        pub struct $name(ResourceClient);

        impl From<ResourceClient> for $name {
            fn from(client: ResourceClient) -> Self {
                Self(client)
            }
        }

        impl $name {
            pub fn identity(&self) -> &str {
                self.0.identity()
            }
        }
    };
}

typed_client!(CounterClient);
typed_client!(QueueClient);
typed_client!(SecretClient);
typed_client!(BucketClient);
typed_client!(FunctionClient);

impl CounterClient {
    /// Increment by `amount`, returning the previous value.
    pub async fn inc(&self, amount: i64) -> InflightResult<i64> {
        as_i64("inc", self.0.call("inc", json!(amount)).await?)
    }

    /// Decrement by `amount`, returning the previous value.
    pub async fn dec(&self, amount: i64) -> InflightResult<i64> {
        as_i64("dec", self.0.call("dec", json!(amount)).await?)
    }

    pub async fn peek(&self) -> InflightResult<i64> {
        as_i64("peek", self.0.call("peek", Value::Null).await?)
    }

    pub async fn set(&self, value: i64) -> InflightResult<()> {
        self.0.call("set", json!(value)).await.map(|_| ())
    }
}

impl QueueClient {
    pub async fn push(&self, message: &str) -> InflightResult<()> {
        self.0.call("push", json!(message)).await.map(|_| ())
    }

    pub async fn pop(&self) -> InflightResult<Option<String>> {
        match self.0.call("pop", Value::Null).await? {
            Value::Null => Ok(None),
            other => as_string("pop", other).map(Some),
        }
    }

    pub async fn approx_size(&self) -> InflightResult<usize> {
        Ok(as_i64("approx_size", self.0.call("approx_size", Value::Null).await?)? as usize)
    }

    pub async fn purge(&self) -> InflightResult<()> {
        self.0.call("purge", Value::Null).await.map(|_| ())
    }
}

impl SecretClient {
    pub async fn value(&self) -> InflightResult<String> {
        as_string("value", self.0.call("value", Value::Null).await?)
    }

    pub async fn value_json(&self) -> InflightResult<Value> {
        self.0.call("value_json", Value::Null).await
    }
}

impl BucketClient {
    pub async fn get(&self, key: &str) -> InflightResult<String> {
        as_string("get", self.0.call("get", json!(key)).await?)
    }

    pub async fn put(&self, key: &str, body: &str) -> InflightResult<()> {
        self.0
            .call("put", json!({ "key": key, "value": body }))
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, key: &str) -> InflightResult<()> {
        self.0.call("delete", json!(key)).await.map(|_| ())
    }

    pub async fn exists(&self, key: &str) -> InflightResult<bool> {
        Ok(self.0.call("exists", json!(key)).await? == Value::Bool(true))
    }

    pub async fn list(&self, prefix: Option<&str>) -> InflightResult<Vec<String>> {
        let out = self.0.call("list", json!(prefix)).await?;
        serde_json::from_value(out).map_err(|e| InflightError::InvalidArgument {
            operation: Operation::new("list"),
            reason: e.to_string(),
        })
    }
}

impl FunctionClient {
    pub async fn invoke(&self, input: Value) -> InflightResult<Value> {
        self.0.call("invoke", input).await
    }

    /// Invoke without using the result. Handler errors are traced, not returned.
    pub async fn invoke_async(&self, input: Value) -> InflightResult<()> {
        self.0.call("invoke_async", input).await.map(|_| ())
    }
}
