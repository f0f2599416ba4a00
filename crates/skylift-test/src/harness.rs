//! Boundary to non-local targets.
//!
//! A harness deploys a compiled output directory and hands back a runner.
//! Lifecycle is opaque: the orchestrator never starts, stops or resets a
//! deployed application, it only lists and runs tests, then cleans up.

use std::path::Path;

use async_trait::async_trait;

use skylift_core::TestResult;

use crate::error::Result;

/// Test runner of a deployed application.
#[async_trait]
pub trait DeployedRunner: Send + Sync {
    async fn list_tests(&self) -> Result<Vec<String>>;
    async fn run_test(&self, path: &str) -> Result<TestResult>;
}

#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn deploy(&self, out_dir: &Path) -> Result<Box<dyn DeployedRunner>>;
    async fn cleanup(&self, out_dir: &Path) -> Result<()>;
}
