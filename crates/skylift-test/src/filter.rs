//! Test-name filtering.

use regex::Regex;

use crate::error::Result;

/// Regex over the part of a test path after the first `:`.
///
/// `root/env1/test:get:At()` is matched against `get:At()`. An absent or
/// empty pattern matches every test.
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    regex: Option<Regex>,
}

impl TestFilter {
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let regex = match pattern {
            Some(p) if !p.is_empty() => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(Self { regex })
    }

    pub fn matches(&self, test_path: &str) -> bool {
        let Some(regex) = &self.regex else {
            return true;
        };
        match test_path.split_once(':') {
            Some((_, name)) if !name.is_empty() => regex.is_match(name),
            _ => false,
        }
    }

    pub fn apply(&self, tests: Vec<String>) -> Vec<String> {
        tests.into_iter().filter(|t| self.matches(t)).collect()
    }
}
