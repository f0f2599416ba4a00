//! Test file discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, TestError};

/// Suffix of test files found by the directory walk.
pub const TEST_FILE_SUFFIX: &str = ".test.json";

const IGNORED_DIRS: &[&str] = &["target", "node_modules", "__snapshots__"];

/// Resolves entrypoint arguments to test files.
pub trait TestFileDiscovery: Send + Sync {
    fn discover(&self, entrypoints: &[String]) -> Result<Vec<PathBuf>>;
}

/// Filesystem discovery rooted at a directory.
///
/// Entrypoints naming an existing file are taken as-is. Any other entrypoint
/// selects the walked test files whose path, relative to the root, contains
/// it. With no entrypoints, every test file under the root is selected.
/// Results are canonical paths, deduplicated.
#[derive(Debug, Clone)]
pub struct FsDiscovery {
    root: PathBuf,
}

impl FsDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = std::fs::read_dir(dir)
            .map_err(|e| TestError::io(dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect::<Vec<_>>();
        entries.sort();
        for path in entries {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if path.is_dir() {
                if !name.starts_with('.') && !IGNORED_DIRS.contains(&name.as_str()) {
                    self.walk(&path, out)?;
                }
            } else if name.ends_with(TEST_FILE_SUFFIX) {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl TestFileDiscovery for FsDiscovery {
    fn discover(&self, entrypoints: &[String]) -> Result<Vec<PathBuf>> {
        let resolve = |e: &str| {
            let p = Path::new(e);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        };
        let (exact, fuzzy): (Vec<&String>, Vec<&String>) =
            entrypoints.iter().partition(|e| resolve(e).is_file());

        let mut selected: Vec<PathBuf> = exact.iter().map(|e| resolve(e)).collect();
        if !fuzzy.is_empty() || exact.is_empty() {
            let mut walked = Vec::new();
            self.walk(&self.root, &mut walked)?;
            selected.extend(walked.into_iter().filter(|path| {
                let shown = path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy();
                fuzzy.is_empty() || fuzzy.iter().any(|f| shown.contains(f.as_str()))
            }));
        }

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for path in selected {
            let canonical = path.canonicalize().map_err(|e| TestError::io(&path, e))?;
            if seen.insert(canonical.clone()) {
                files.push(canonical);
            }
        }
        tracing::debug!(count = files.len(), "discovered test files");
        Ok(files)
    }
}

/// Discovery over a fixed list of files.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    files: Vec<PathBuf>,
}

impl StaticDiscovery {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }
}

impl TestFileDiscovery for StaticDiscovery {
    fn discover(&self, _entrypoints: &[String]) -> Result<Vec<PathBuf>> {
        Ok(self.files.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::create_dir_all(root.join("target/old")).unwrap();
        for f in [
            "one.test.json",
            "a/two.test.json",
            "a/b/three.test.json",
            "a/notes.json",
            "target/old/stale.test.json",
        ] {
            std::fs::write(root.join(f), "{}").unwrap();
        }
        dir
    }

    fn relative(dir: &tempfile::TempDir, files: Vec<PathBuf>) -> Vec<PathBuf> {
        let root = dir.path().canonicalize().unwrap();
        files
            .into_iter()
            .map(|f| f.strip_prefix(&root).unwrap().to_path_buf())
            .collect()
    }

    #[test]
    fn test_default_entrypoints_walk_everything() {
        let dir = tree();
        let files = relative(&dir, FsDiscovery::new(dir.path()).discover(&[]).unwrap());
        assert_eq!(
            files,
            vec![
                PathBuf::from("a/b/three.test.json"),
                PathBuf::from("a/two.test.json"),
                PathBuf::from("one.test.json"),
            ]
        );
    }

    #[test]
    fn test_specific_entrypoint() {
        let dir = tree();
        let files = FsDiscovery::new(dir.path())
            .discover(&["a/two.test.json".to_string()])
            .unwrap();
        let files = relative(&dir, files);
        assert_eq!(files, vec![PathBuf::from("a/two.test.json")]);
    }

    #[test]
    fn test_fuzzy_match_dir() {
        let dir = tree();
        let files = FsDiscovery::new(dir.path()).discover(&["a/b".to_string()]).unwrap();
        let files = relative(&dir, files);
        assert_eq!(files, vec![PathBuf::from("a/b/three.test.json")]);
    }

    #[test]
    fn test_absolute_path_dedupe() {
        let dir = tree();
        let abs = dir.path().join("one.test.json").display().to_string();
        let files = FsDiscovery::new(dir.path())
            .discover(&[abs, "one.test.json".to_string()])
            .unwrap();
        let files = relative(&dir, files);
        assert_eq!(files, vec![PathBuf::from("one.test.json")]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let dir = tree();
        let files = FsDiscovery::new(dir.path()).discover(&["zzz".to_string()]).unwrap();
        assert!(files.is_empty());
    }
}
