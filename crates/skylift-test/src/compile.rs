//! Compiling a test file into a synthesized output directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use skylift_core::obs::emit_file_compiled;
use skylift_core::{LiftConfig, Target};
use skylift_sim::{App, AppBuilder, AppManifest, SIMFILE};

use crate::error::{Result, TestError};

/// File written for non-sim targets: the rendered deployment template.
pub const TEMPLATE_FILE: &str = "infrastructure.json";

/// Output of one compilation.
#[derive(Debug, Clone)]
pub struct CompiledApp {
    pub out_dir: PathBuf,
    pub app: App,
}

impl CompiledApp {
    pub fn simfile(&self) -> PathBuf {
        self.out_dir.join(SIMFILE)
    }

    /// Rendered deployment template, `Null` for the simulator.
    pub fn template(&self) -> Value {
        self.app.template.clone().unwrap_or(Value::Null)
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, file: &Path, target: Target, root_id: &str) -> Result<CompiledApp>;
}

/// Compiles JSON manifests with [`AppBuilder`].
///
/// Each compilation gets its own directory `<stem>.<target>.<8 hex>` under
/// `out_root`, or under `target/` next to the test file.
#[derive(Debug, Clone, Default)]
pub struct ManifestCompiler {
    out_root: Option<PathBuf>,
    lift_config: LiftConfig,
}

impl ManifestCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_out_root(mut self, out_root: impl Into<PathBuf>) -> Self {
        self.out_root = Some(out_root.into());
        self
    }

    pub fn with_lift_config(mut self, config: LiftConfig) -> Self {
        self.lift_config = config;
        self
    }

    fn out_dir(&self, file: &Path, target: Target) -> PathBuf {
        let stem = file
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".json").to_string())
            .unwrap_or_else(|| "app".to_string());
        let root = match &self.out_root {
            Some(root) => root.clone(),
            None => file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("target"),
        };
        let suffix = Uuid::new_v4().simple().to_string();
        root.join(format!("{stem}.{}.{}", target.name().replace('-', ""), &suffix[..8]))
    }
}

#[async_trait]
impl Compiler for ManifestCompiler {
    async fn compile(&self, file: &Path, target: Target, root_id: &str) -> Result<CompiledApp> {
        let manifest = AppManifest::load(file)?;
        let app = AppBuilder::new(target)
            .root_id(root_id)
            .lift_config(self.lift_config.clone())
            .build(&manifest)?;

        let out_dir = self.out_dir(file, target);
        std::fs::create_dir_all(&out_dir).map_err(|e| TestError::io(&out_dir, e))?;
        match &app.template {
            Some(template) => {
                let path = out_dir.join(TEMPLATE_FILE);
                let json = serde_json::to_string_pretty(template)?;
                std::fs::write(&path, json).map_err(|e| TestError::io(&path, e))?;
            }
            None => {
                app.write_simfile(&out_dir)?;
            }
        }

        emit_file_compiled(&file.display().to_string(), &out_dir.display().to_string());
        Ok(CompiledApp { out_dir, app })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "resources": [{ "id": "Counter", "kind": "counter" }],
        "tests": [{ "name": "t", "lifts": [{ "alias": "c", "resource": "Counter", "ops": ["inc"] }] }]
    }"#;

    #[tokio::test]
    async fn test_sim_compile_writes_simfile() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("counter.test.json");
        std::fs::write(&file, MANIFEST).unwrap();

        let compiled = ManifestCompiler::new()
            .compile(&file, Target::Sim, "root")
            .await
            .unwrap();
        assert!(compiled.simfile().exists());
        assert!(compiled.out_dir.starts_with(dir.path().join("target")));
        let name = compiled.out_dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("counter.test.sim."), "{name}");
        assert_eq!(compiled.template(), Value::Null);
    }

    #[tokio::test]
    async fn test_cloud_compile_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("counter.test.json");
        std::fs::write(&file, MANIFEST).unwrap();

        let compiled = ManifestCompiler::new()
            .with_out_root(dir.path().join("out"))
            .compile(&file, Target::TfAws, "root")
            .await
            .unwrap();
        assert!(compiled.out_dir.join(TEMPLATE_FILE).exists());
        assert!(compiled.out_dir.starts_with(dir.path().join("out")));
        assert_eq!(compiled.template()["target"], "tf-aws");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = ManifestCompiler::new()
            .compile(Path::new("/nonexistent/x.test.json"), Target::Sim, "root")
            .await
            .unwrap_err();
        assert!(!err.is_construction());
    }
}
