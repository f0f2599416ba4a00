//! Test orchestration errors.

use std::path::PathBuf;

use skylift_core::{LiftError, Target};
use skylift_sim::SimError;

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("No matching test or entrypoint files found: [{}]", .entrypoints.join(", "))]
    NoTestFiles { entrypoints: Vec<String> },

    #[error("only .json output files are supported. (found \"{found}\")")]
    UnsupportedOutputFormat { found: String },

    #[error("invalid test filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error(transparent)]
    Lift(#[from] LiftError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Cannot run tests against the {0} target without a test harness")]
    NoHarness(Target),

    #[error("harness failure: {0}")]
    Harness(String),

    #[error("snapshot store error: {0}")]
    Snapshot(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("test task failed: {0}")]
    Task(String),
}

impl TestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TestError::Io {
            path: path.into(),
            source,
        }
    }

    /// Construction errors describe a structurally invalid application and
    /// abort the whole run instead of being retried.
    pub fn is_construction(&self) -> bool {
        match self {
            TestError::Lift(_) => true,
            TestError::Sim(e) => e.is_construction(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TestError>;
