//! Sensitive-operation classification.
//!
//! Separate from injection detection: sensitive operations are not blocked,
//! their results are wrapped with a warning by the invocation pipeline.

use crate::injection::Severity;
use serde_json::{Map, Value};

/// Resources where an update can affect availability or access control.
const CRITICAL_RESOURCES: [&str; 6] = [
    "clusters",
    "environments",
    "service-accounts",
    "api-keys",
    "role-bindings",
    "acls",
];

/// Argument values that smell like privilege grants.
const ADMIN_PATTERNS: [&str; 8] = [
    "admin",
    "root",
    "superuser",
    "owner",
    "full",
    "*",
    "all",
    "wildcard",
];

/// Classification of a tool operation.
#[derive(Debug, Clone)]
pub struct SensitiveOperation {
    pub is_sensitive: bool,
    pub warning: String,
    pub severity: Severity,
}

impl SensitiveOperation {
    fn benign() -> Self {
        Self {
            is_sensitive: false,
            warning: String::new(),
            severity: Severity::Low,
        }
    }
}

/// Classify a (tool, resource, arguments) triple.
#[must_use]
pub fn check_sensitive_operation(
    tool: &str,
    resource: &str,
    args: &Map<String, Value>,
) -> SensitiveOperation {
    if tool == "delete" {
        return SensitiveOperation {
            is_sensitive: true,
            severity: Severity::High,
            warning: format!(
                "DESTRUCTIVE OPERATION: This will permanently delete the {resource}. \
                 This action cannot be undone."
            ),
        };
    }

    if tool == "update" && CRITICAL_RESOURCES.contains(&resource) {
        return SensitiveOperation {
            is_sensitive: true,
            severity: Severity::Medium,
            warning: format!(
                "SENSITIVE OPERATION: Updating {resource} configuration may affect \
                 system availability."
            ),
        };
    }

    if tool == "create" && has_admin_arguments(args) {
        return SensitiveOperation {
            is_sensitive: true,
            severity: Severity::Medium,
            warning: "PRIVILEGED OPERATION: Creating resources with administrative privileges."
                .to_string(),
        };
    }

    SensitiveOperation::benign()
}

fn has_admin_arguments(args: &Map<String, Value>) -> bool {
    args.values().any(|value| {
        value.as_str().is_some_and(|s| {
            let lower = s.to_ascii_lowercase();
            ADMIN_PATTERNS.iter().any(|p| lower.contains(p))
        })
    })
}
