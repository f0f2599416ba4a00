//! Interpreter for declarative step scripts.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{InflightError, InflightResult};
use crate::inflight::{InflightContext, InflightHandler};
use crate::manifest::Step;

/// Runs a list of [`Step`]s in order and returns the last call's output.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandler {
    steps: Vec<Step>,
}

impl ScriptHandler {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl InflightHandler for ScriptHandler {
    async fn handle(&self, ctx: InflightContext, _input: Value) -> InflightResult<Value> {
        let mut last = Value::Null;
        for step in &self.steps {
            match step {
                Step::Log { message } => ctx.log(message.clone()),
                Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
                Step::Call {
                    binding,
                    method,
                    args,
                    expect,
                } => {
                    let out = ctx.call(binding, method, args.clone()).await?;
                    if let Some(expected) = expect {
                        if &out != expected {
                            return Err(InflightError::failed(format!(
                                "{binding}.{method}: expected {expected}, got {out}"
                            )));
                        }
                    }
                    last = out;
                }
                Step::Fail { message } => return Err(InflightError::failed(message.clone())),
                Step::Unsupported {
                    resource,
                    operation,
                } => {
                    return Err(InflightError::Unsupported {
                        resource: resource.clone(),
                        operation: operation.clone(),
                    })
                }
            }
        }
        Ok(last)
    }
}
