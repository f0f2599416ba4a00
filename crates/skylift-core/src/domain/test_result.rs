//! Test entries and per-attempt results.

use serde::{Deserialize, Serialize};

use super::trace::TraceEvent;

/// Outcome of running one test entry once.
///
/// A retry produces a fresh `TestResult`; results are never mutated after
/// the attempt that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test path, `<root>/<env>/test:<name>`, or `*` for a whole-file failure.
    pub path: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub traces: Vec<TraceEvent>,
    /// The target does not implement a feature the test needs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unsupported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_operation: Option<String>,
}

impl TestResult {
    pub fn passed(path: impl Into<String>, traces: Vec<TraceEvent>) -> Self {
        Self {
            path: path.into(),
            pass: true,
            error: None,
            traces,
            unsupported: false,
            unsupported_resource: None,
            unsupported_operation: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>, traces: Vec<TraceEvent>) -> Self {
        Self {
            path: path.into(),
            pass: false,
            error: Some(error.into()),
            traces,
            unsupported: false,
            unsupported_resource: None,
            unsupported_operation: None,
        }
    }

    pub fn unsupported(
        path: impl Into<String>,
        error: impl Into<String>,
        resource: impl Into<String>,
        operation: impl Into<String>,
        traces: Vec<TraceEvent>,
    ) -> Self {
        Self {
            unsupported: true,
            unsupported_resource: Some(resource.into()),
            unsupported_operation: Some(operation.into()),
            ..Self::failed(path, error, traces)
        }
    }

    /// Whether this result fails the run: `pass=false` and not unsupported.
    pub fn is_failure(&self) -> bool {
        !self.pass && !self.unsupported
    }
}

/// Short name of a test: the part of the path segment after `test:`.
///
/// `root/foo/bar/test:first test/baz` yields `first test`.
pub fn test_name_from_path(path: &str) -> Option<&str> {
    path.split('/').find_map(|part| part.strip_prefix("test:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_extraction() {
        assert_eq!(
            test_name_from_path("root/foo/bar/test:first test/baz"),
            Some("first test")
        );
        assert_eq!(test_name_from_path("root/env0/test:get:At()"), Some("get:At()"));
        assert_eq!(test_name_from_path("root/env0/Bucket"), None);
    }

    #[test]
    fn test_unsupported_is_not_a_failure() {
        let r = TestResult::unsupported("*", "nope", "cloud.Queue", "purge", vec![]);
        assert!(!r.pass);
        assert!(!r.is_failure());
        assert!(TestResult::failed("*", "boom", vec![]).is_failure());
        assert!(!TestResult::passed("root/env0/test:a", vec![]).is_failure());
    }

    #[test]
    fn test_result_omits_unset_fields() {
        let raw = serde_json::to_value(TestResult::passed("p", vec![])).unwrap();
        let obj = raw.as_object().unwrap();
        assert!(!obj.contains_key("error"));
        assert!(!obj.contains_key("unsupported"));
        assert_eq!(raw["pass"], true);
    }
}
