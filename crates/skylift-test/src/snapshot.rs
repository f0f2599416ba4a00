//! Snapshot gating and baseline storage.
//!
//! The mode decides two things per file: whether tests execute at all, and
//! what happens to the synthesized deployment template once they pass.
//!
//! | mode   | execute | on success            |
//! |--------|---------|-----------------------|
//! | never  | yes     | nothing               |
//! | deploy | yes     | nothing               |
//! | update | no      | write the baseline    |
//! | assert | no      | compare with baseline |
//!
//! `auto` resolves to `assert` in CI and `update` elsewhere. The `sim`
//! target always resolves to `never`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use skylift_core::Target;

use crate::error::{Result, TestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    Never,
    Deploy,
    Update,
    Assert,
    #[default]
    Auto,
}

impl SnapshotMode {
    pub fn resolve(self, target: Target, ci: bool) -> SnapshotMode {
        if target == Target::Sim {
            return SnapshotMode::Never;
        }
        match self {
            SnapshotMode::Auto if ci => SnapshotMode::Assert,
            SnapshotMode::Auto => SnapshotMode::Update,
            other => other,
        }
    }

    /// Whether tests run against the deployed application.
    pub fn should_execute(self) -> bool {
        matches!(self, SnapshotMode::Never | SnapshotMode::Deploy)
    }
}

impl FromStr for SnapshotMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never" => Ok(SnapshotMode::Never),
            "deploy" => Ok(SnapshotMode::Deploy),
            "update" => Ok(SnapshotMode::Update),
            "assert" => Ok(SnapshotMode::Assert),
            "auto" => Ok(SnapshotMode::Auto),
            other => Err(format!(
                "unknown snapshot mode \"{other}\" (expected never, deploy, update, assert or auto)"
            )),
        }
    }
}

/// What happened to a file's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotDecision {
    /// Baseline written.
    Capture,
    /// Baseline compared equal.
    Match,
    Deploy,
    Never,
    /// Baseline missing or different.
    Mismatch,
    /// Tests failed, snapshot untouched.
    Skipped,
}

/// Baseline storage keyed by test file and target.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, file: &Path, target: Target) -> Result<Option<Value>>;
    fn save(&self, file: &Path, target: Target, snapshot: &Value) -> Result<()>;
}

/// Stores baselines next to the test file in `__snapshots__/`.
#[derive(Debug, Clone, Default)]
pub struct FsSnapshotStore;

impl FsSnapshotStore {
    pub fn snapshot_path(file: &Path, target: Target) -> PathBuf {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        file.parent()
            .unwrap_or_else(|| Path::new("."))
            .join("__snapshots__")
            .join(format!("{name}.{target}.snap.json"))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn load(&self, file: &Path, target: Target) -> Result<Option<Value>> {
        let path = Self::snapshot_path(file, target);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TestError::io(path, e)),
        }
    }

    fn save(&self, file: &Path, target: Target, snapshot: &Value) -> Result<()> {
        let path = Self::snapshot_path(file, target);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| TestError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&path, json).map_err(|e| TestError::io(&path, e))
    }
}

/// Apply a resolved `mode` to a passing file's synthesized `artifact`.
pub fn capture_snapshot(
    store: &dyn SnapshotStore,
    file: &Path,
    target: Target,
    mode: SnapshotMode,
    artifact: &Value,
) -> Result<SnapshotDecision> {
    let decision = match mode {
        SnapshotMode::Never | SnapshotMode::Auto => SnapshotDecision::Never,
        SnapshotMode::Deploy => SnapshotDecision::Deploy,
        SnapshotMode::Update => {
            store.save(file, target, artifact)?;
            SnapshotDecision::Capture
        }
        SnapshotMode::Assert => match store.load(file, target)? {
            Some(baseline) if &baseline == artifact => SnapshotDecision::Match,
            _ => SnapshotDecision::Mismatch,
        },
    };
    tracing::debug!(file = %file.display(), ?mode, ?decision, "snapshot decision");
    Ok(decision)
}
