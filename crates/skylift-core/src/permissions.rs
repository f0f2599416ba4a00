//! Permission calculation: (resource, operations, target) -> grant fragment.
//!
//! This is the only place the operation -> grant tables live. Every kind
//! classifies its operations as read or write (see
//! [`ResourceKind::access_for`]); an operation set is granted the minimal
//! access level covering all of its members, and the read-write grant of a
//! kind is always a superset of its read grant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{
    AccessLevel, LiftError, Operation, Provider, Resource, ResourceKind, Result, Target,
};

/// A target-specific authorization statement for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantFragment {
    /// IAM-style policy statement.
    AwsPolicyStatement {
        effect: String,
        actions: Vec<String>,
        resources: Vec<String>,
    },
    /// Role assignment scoped to an ARM resource id.
    AzureRoleAssignment {
        role: String,
        scope: String,
        access: AccessLevel,
    },
    /// IAM role binding on a GCP resource.
    GcpRoleBinding {
        role: String,
        resource: String,
        access: AccessLevel,
    },
    /// Allowed operations in the simulator's access table.
    SimAccess {
        identity: String,
        operations: Vec<Operation>,
    },
}

impl GrantFragment {
    /// Whether every permission in `other` is also granted by `self`.
    pub fn covers(&self, other: &GrantFragment) -> bool {
        match (self, other) {
            (
                GrantFragment::AwsPolicyStatement {
                    effect: e1,
                    actions: a1,
                    resources: r1,
                },
                GrantFragment::AwsPolicyStatement {
                    effect: e2,
                    actions: a2,
                    resources: r2,
                },
            ) => e1 == e2 && is_subset(a2, a1) && is_subset(r2, r1),
            (
                GrantFragment::AzureRoleAssignment {
                    scope: s1,
                    access: l1,
                    ..
                },
                GrantFragment::AzureRoleAssignment {
                    scope: s2,
                    access: l2,
                    ..
                },
            ) => s1 == s2 && l1 >= l2,
            (
                GrantFragment::GcpRoleBinding {
                    resource: r1,
                    access: l1,
                    ..
                },
                GrantFragment::GcpRoleBinding {
                    resource: r2,
                    access: l2,
                    ..
                },
            ) => r1 == r2 && l1 >= l2,
            (
                GrantFragment::SimAccess {
                    identity: i1,
                    operations: o1,
                },
                GrantFragment::SimAccess {
                    identity: i2,
                    operations: o2,
                },
            ) => i1 == i2 && is_subset(o2, o1),
            _ => false,
        }
    }
}

fn is_subset<T: Ord>(small: &[T], big: &[T]) -> bool {
    let big: BTreeSet<&T> = big.iter().collect();
    small.iter().all(|x| big.contains(x))
}

/// Minimal access level covering `operations`, or `None` for an empty set.
pub fn required_access(
    kind: ResourceKind,
    operations: &BTreeSet<Operation>,
) -> Result<Option<AccessLevel>> {
    let mut level = None;
    for op in operations {
        let access = kind
            .access_for(op)
            .ok_or_else(|| LiftError::UnknownOperation {
                kind,
                operation: op.to_string(),
            })?;
        level = level.max(Some(access));
    }
    Ok(level)
}

/// Compute the grant `target` needs so a host may perform `operations` on
/// `resource`.
///
/// Returns `Ok(None)` when no grant is needed: an empty operation set, or a
/// test runner (its grants are the invoke grants of its test functions).
pub fn compute_grant(
    resource: &Resource,
    operations: &BTreeSet<Operation>,
    target: Target,
) -> Result<Option<GrantFragment>> {
    resource.identity.validate(resource.kind, target)?;

    let Some(level) = required_access(resource.kind, operations)? else {
        return Ok(None);
    };
    if resource.kind == ResourceKind::TestRunner {
        return Ok(None);
    }

    let identity = resource.identity.as_str();
    let fragment = match target.provider() {
        Provider::Sim => {
            let ops = match level {
                AccessLevel::Read => resource
                    .kind
                    .read_operations()
                    .iter()
                    .map(|op| Operation::new(*op))
                    .collect(),
                AccessLevel::ReadWrite => resource.kind.operations(),
            };
            GrantFragment::SimAccess {
                identity: identity.to_string(),
                operations: ops,
            }
        }
        Provider::Aws => {
            let (read, write) = aws_actions(resource.kind);
            let mut actions: Vec<String> = read.iter().map(|a| a.to_string()).collect();
            if level == AccessLevel::ReadWrite {
                actions.extend(write.iter().map(|a| a.to_string()));
            }
            actions.sort();
            actions.dedup();

            let resources = match resource.kind {
                ResourceKind::Bucket => vec![identity.to_string(), format!("{identity}/*")],
                // Managed secrets carry a random 6-character suffix.
                ResourceKind::Secret if !resource.imported => vec![format!("{identity}-??????")],
                _ => vec![identity.to_string()],
            };
            GrantFragment::AwsPolicyStatement {
                effect: "Allow".to_string(),
                actions,
                resources,
            }
        }
        Provider::Azure => GrantFragment::AzureRoleAssignment {
            role: azure_role(resource.kind, level).to_string(),
            scope: identity.to_string(),
            access: level,
        },
        Provider::Gcp => GrantFragment::GcpRoleBinding {
            role: gcp_role(resource.kind, level).to_string(),
            resource: identity.to_string(),
            access: level,
        },
    };
    Ok(Some(fragment))
}

/// (read actions, additional write actions)
fn aws_actions(kind: ResourceKind) -> (&'static [&'static str], &'static [&'static str]) {
    match kind {
        ResourceKind::Counter => (&["dynamodb:GetItem"], &["dynamodb:UpdateItem"]),
        ResourceKind::Queue => (
            &["sqs:GetQueueAttributes", "sqs:GetQueueUrl"],
            &[
                "sqs:SendMessage",
                "sqs:ReceiveMessage",
                "sqs:ChangeMessageVisibility",
                "sqs:DeleteMessage",
                "sqs:PurgeQueue",
            ],
        ),
        ResourceKind::Secret => (&["secretsmanager:GetSecretValue"], &[]),
        ResourceKind::Bucket => (
            &["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
            &["s3:PutObject*", "s3:Abort*", "s3:DeleteObject*"],
        ),
        ResourceKind::Function | ResourceKind::TestRunner => (&["lambda:InvokeFunction"], &[]),
    }
}

fn azure_role(kind: ResourceKind, level: AccessLevel) -> &'static str {
    match (kind, level) {
        (ResourceKind::Counter, AccessLevel::Read) => "Storage Table Data Reader",
        (ResourceKind::Counter, AccessLevel::ReadWrite) => "Storage Table Data Contributor",
        (ResourceKind::Queue, AccessLevel::Read) => "Storage Queue Data Reader",
        (ResourceKind::Queue, AccessLevel::ReadWrite) => "Storage Queue Data Contributor",
        (ResourceKind::Bucket, AccessLevel::Read) => "Storage Blob Data Reader",
        (ResourceKind::Bucket, AccessLevel::ReadWrite) => "Storage Blob Data Contributor",
        (ResourceKind::Secret, _) => "Key Vault Secrets User",
        (ResourceKind::Function | ResourceKind::TestRunner, _) => "Website Contributor",
    }
}

fn gcp_role(kind: ResourceKind, level: AccessLevel) -> &'static str {
    match (kind, level) {
        (ResourceKind::Counter, AccessLevel::Read) => "roles/datastore.viewer",
        (ResourceKind::Counter, AccessLevel::ReadWrite) => "roles/datastore.user",
        (ResourceKind::Queue, AccessLevel::Read) => "roles/pubsub.viewer",
        (ResourceKind::Queue, AccessLevel::ReadWrite) => "roles/pubsub.editor",
        (ResourceKind::Bucket, AccessLevel::Read) => "roles/storage.objectViewer",
        (ResourceKind::Bucket, AccessLevel::ReadWrite) => "roles/storage.objectAdmin",
        (ResourceKind::Secret, _) => "roles/secretmanager.secretAccessor",
        (ResourceKind::Function | ResourceKind::TestRunner, _) => "roles/cloudfunctions.invoker",
    }
}
