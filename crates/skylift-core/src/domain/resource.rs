//! Resources, hosts, targets and identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{LiftError, Result};

/// Resource behaviour tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Counter,
    Queue,
    Secret,
    Bucket,
    Function,
    TestRunner,
}

/// Access level an operation set requires. Ordered: `Read < ReadWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    ReadWrite,
}

impl ResourceKind {
    /// Operations that only observe the resource.
    pub fn read_operations(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Counter => &["peek"],
            ResourceKind::Queue => &["approx_size"],
            ResourceKind::Secret => &["value", "value_json"],
            ResourceKind::Bucket => &["get", "list", "exists"],
            ResourceKind::Function => &["invoke", "invoke_async"],
            ResourceKind::TestRunner => &["list_tests", "run_test"],
        }
    }

    /// Operations that mutate the resource.
    pub fn write_operations(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Counter => &["inc", "dec", "set"],
            ResourceKind::Queue => &["push", "pop", "purge"],
            ResourceKind::Bucket => &["put", "delete"],
            ResourceKind::Secret | ResourceKind::Function | ResourceKind::TestRunner => &[],
        }
    }

    /// All operations, reads first, in declaration order.
    pub fn operations(&self) -> Vec<Operation> {
        self.read_operations()
            .iter()
            .chain(self.write_operations())
            .map(|op| Operation::new(*op))
            .collect()
    }

    /// Classify a single operation, `None` if the kind does not know it.
    pub fn access_for(&self, op: &Operation) -> Option<AccessLevel> {
        if self.read_operations().contains(&op.as_str()) {
            Some(AccessLevel::Read)
        } else if self.write_operations().contains(&op.as_str()) {
            Some(AccessLevel::ReadWrite)
        } else {
            None
        }
    }

    /// Prefix of environment binding names exposing this kind's identity.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Counter => "COUNTER",
            ResourceKind::Queue => "QUEUE",
            ResourceKind::Secret => "SECRET",
            ResourceKind::Bucket => "BUCKET",
            ResourceKind::Function => "FUNCTION",
            ResourceKind::TestRunner => "TEST_RUNNER_FUNCTIONS",
        }
    }

    /// `sourceType` stamped on traces emitted by this kind.
    pub fn source_type(&self) -> &'static str {
        match self {
            ResourceKind::Counter => "cloud.Counter",
            ResourceKind::Queue => "cloud.Queue",
            ResourceKind::Secret => "cloud.Secret",
            ResourceKind::Bucket => "cloud.Bucket",
            ResourceKind::Function => "cloud.Function",
            ResourceKind::TestRunner => "cloud.TestRunner",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Counter => "counter",
            ResourceKind::Queue => "queue",
            ResourceKind::Secret => "secret",
            ResourceKind::Bucket => "bucket",
            ResourceKind::Function => "function",
            ResourceKind::TestRunner => "test_runner",
        };
        write!(f, "{s}")
    }
}

/// An inflight operation name, e.g. `inc` or `push`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(String);

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of execution environment inflight code runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Function,
    TestRunner,
    /// Static website: receives configuration bindings only.
    Website,
}

impl HostKind {
    /// Whether authorization grants can be attached to this host.
    pub fn accepts_grants(&self) -> bool {
        !matches!(self, HostKind::Website)
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKind::Function => write!(f, "function"),
            HostKind::TestRunner => write!(f, "test_runner"),
            HostKind::Website => write!(f, "website"),
        }
    }
}

/// Deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "sim")]
    Sim,
    #[serde(rename = "tf-aws")]
    TfAws,
    #[serde(rename = "awscdk")]
    AwsCdk,
    #[serde(rename = "tf-azure")]
    TfAzure,
    #[serde(rename = "tf-gcp")]
    TfGcp,
}

/// Cloud provider family a target deploys to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Sim,
    Aws,
    Azure,
    Gcp,
}

impl Target {
    pub fn provider(&self) -> Provider {
        match self {
            Target::Sim => Provider::Sim,
            Target::TfAws | Target::AwsCdk => Provider::Aws,
            Target::TfAzure => Provider::Azure,
            Target::TfGcp => Provider::Gcp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Sim => "sim",
            Target::TfAws => "tf-aws",
            Target::AwsCdk => "awscdk",
            Target::TfAzure => "tf-azure",
            Target::TfGcp => "tf-gcp",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sim" => Ok(Target::Sim),
            "tf-aws" => Ok(Target::TfAws),
            "awscdk" => Ok(Target::AwsCdk),
            "tf-azure" => Ok(Target::TfAzure),
            "tf-gcp" => Ok(Target::TfGcp),
            other => Err(format!(
                "unknown target \"{other}\" (expected sim, tf-aws, awscdk, tf-azure or tf-gcp)"
            )),
        }
    }
}

const AWS_REGION: &str = "us-east-1";
const AWS_ACCOUNT: &str = "000000000000";
const AZURE_SCOPE: &str =
    "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/skylift";
const GCP_PROJECT: &str = "skylift";

/// Opaque target-specific handle of a resource (ARN, ARM id, resource name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the identity a target would assign a managed resource at `path`.
    pub fn synthesize(kind: ResourceKind, target: Target, path: &str) -> Self {
        if kind == ResourceKind::TestRunner {
            let scheme = if target == Target::Sim { "sim" } else { "runner" };
            return Self(format!("{scheme}://{path}"));
        }

        let name = physical_name(path);
        let value = match target.provider() {
            Provider::Sim => format!("sim://{path}"),
            Provider::Aws => match kind {
                ResourceKind::Counter => {
                    format!("arn:aws:dynamodb:{AWS_REGION}:{AWS_ACCOUNT}:table/{name}")
                }
                ResourceKind::Queue => format!("arn:aws:sqs:{AWS_REGION}:{AWS_ACCOUNT}:{name}"),
                ResourceKind::Secret => {
                    format!("arn:aws:secretsmanager:{AWS_REGION}:{AWS_ACCOUNT}:secret:{name}")
                }
                ResourceKind::Bucket => format!("arn:aws:s3:::{name}"),
                ResourceKind::Function | ResourceKind::TestRunner => {
                    format!("arn:aws:lambda:{AWS_REGION}:{AWS_ACCOUNT}:function:{name}")
                }
            },
            Provider::Azure => match kind {
                ResourceKind::Counter => format!(
                    "{AZURE_SCOPE}/providers/Microsoft.Storage/storageAccounts/skylift/tableServices/default/tables/{}",
                    name.replace('-', "")
                ),
                ResourceKind::Queue => format!(
                    "{AZURE_SCOPE}/providers/Microsoft.Storage/storageAccounts/skylift/queueServices/default/queues/{name}"
                ),
                ResourceKind::Bucket => format!(
                    "{AZURE_SCOPE}/providers/Microsoft.Storage/storageAccounts/skylift/blobServices/default/containers/{name}"
                ),
                ResourceKind::Secret => {
                    format!("{AZURE_SCOPE}/providers/Microsoft.KeyVault/vaults/skylift/secrets/{name}")
                }
                ResourceKind::Function | ResourceKind::TestRunner => {
                    format!("{AZURE_SCOPE}/providers/Microsoft.Web/sites/{name}")
                }
            },
            Provider::Gcp => match kind {
                ResourceKind::Counter => {
                    format!("projects/{GCP_PROJECT}/databases/(default)/documents/counters/{name}")
                }
                ResourceKind::Queue => format!("projects/{GCP_PROJECT}/topics/{name}"),
                ResourceKind::Secret => format!("projects/{GCP_PROJECT}/secrets/{name}"),
                ResourceKind::Bucket => format!("projects/_/buckets/{name}"),
                ResourceKind::Function | ResourceKind::TestRunner => {
                    format!("projects/{GCP_PROJECT}/locations/us-central1/functions/{name}")
                }
            },
        };
        Self(value)
    }

    /// Check that this identity has the shape `kind` expects on `target`.
    pub fn validate(&self, kind: ResourceKind, target: Target) -> Result<()> {
        let invalid = |reason: String| LiftError::InvalidIdentity {
            identity: self.0.clone(),
            kind,
            reason,
        };

        if self.0.trim().is_empty() {
            return Err(invalid("identity is empty".to_string()));
        }

        if kind == ResourceKind::TestRunner {
            let scheme = if target == Target::Sim { "sim://" } else { "runner://" };
            return if self.0.starts_with(scheme) {
                Ok(())
            } else {
                Err(invalid(format!("expected a {scheme} identity")))
            };
        }

        match target.provider() {
            Provider::Sim => {
                if self.0.strip_prefix("sim://").is_some_and(|p| !p.is_empty()) {
                    Ok(())
                } else {
                    Err(invalid("expected a sim:// identity".to_string()))
                }
            }
            Provider::Aws => {
                let service = match kind {
                    ResourceKind::Counter => "dynamodb",
                    ResourceKind::Queue => "sqs",
                    ResourceKind::Secret => "secretsmanager",
                    ResourceKind::Bucket => "s3",
                    ResourceKind::Function | ResourceKind::TestRunner => "lambda",
                };
                let parts: Vec<&str> = self.0.split(':').collect();
                if parts.len() < 6 || parts[0] != "arn" || !parts[1].starts_with("aws") {
                    return Err(invalid("not an ARN".to_string()));
                }
                if parts[2] != service {
                    return Err(invalid(format!("not a valid {service} arn")));
                }
                Ok(())
            }
            Provider::Azure => {
                let provider = match kind {
                    ResourceKind::Counter | ResourceKind::Queue | ResourceKind::Bucket => {
                        "/providers/Microsoft.Storage/"
                    }
                    ResourceKind::Secret => "/providers/Microsoft.KeyVault/",
                    ResourceKind::Function | ResourceKind::TestRunner => {
                        "/providers/Microsoft.Web/sites/"
                    }
                };
                if !self.0.starts_with("/subscriptions/") {
                    return Err(invalid("not an Azure resource id".to_string()));
                }
                if !self.0.contains(provider) {
                    return Err(invalid(format!("expected provider segment {provider}")));
                }
                Ok(())
            }
            Provider::Gcp => {
                let collection = match kind {
                    ResourceKind::Counter => "/databases/",
                    ResourceKind::Queue => "/topics/",
                    ResourceKind::Secret => "/secrets/",
                    ResourceKind::Bucket => "/buckets/",
                    ResourceKind::Function | ResourceKind::TestRunner => "/functions/",
                };
                if !self.0.starts_with("projects/") {
                    return Err(invalid("not a GCP resource name".to_string()));
                }
                if !self.0.contains(collection) {
                    return Err(invalid(format!("expected collection {collection}")));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, dash-separated physical name with a short path hash.
fn physical_name(path: &str) -> String {
    let last = path.rsplit('/').next().unwrap_or(path);
    let mut base: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    base.truncate(40);
    let digest = hex::encode(Sha256::digest(path.as_bytes()));
    format!("{}-{}", base.trim_matches('-'), &digest[..8])
}

/// A node of the application's resource graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique hierarchical address, e.g. `root/env0/Counter`.
    pub path: String,
    pub kind: ResourceKind,
    pub identity: ResourceIdentity,
    /// Refers to a resource managed outside the application.
    #[serde(default)]
    pub imported: bool,
}

impl Resource {
    /// A managed resource whose identity the target assigns.
    pub fn managed(path: impl Into<String>, kind: ResourceKind, target: Target) -> Self {
        let path = path.into();
        let identity = ResourceIdentity::synthesize(kind, target, &path);
        Self {
            path,
            kind,
            identity,
            imported: false,
        }
    }

    /// A reference to an existing resource. The identity is validated.
    pub fn imported(
        path: impl Into<String>,
        kind: ResourceKind,
        identity: ResourceIdentity,
        target: Target,
    ) -> Result<Self> {
        identity.validate(kind, target)?;
        Ok(Self {
            path: path.into(),
            kind,
            identity,
            imported: true,
        })
    }

    pub fn supported_operations(&self) -> Vec<Operation> {
        self.kind.operations()
    }
}
