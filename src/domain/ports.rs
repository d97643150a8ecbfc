//! Domain Ports - Core trait definitions for the volume agent
//!
//! These traits define the boundaries between the provisioning/mount logic
//! and the external systems it drives: the compute API, the instance
//! metadata service, and the OS command line.

use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// Status string a finished zone operation reports
pub const STATUS_DONE: &str = "DONE";

/// Prefix for every disk this agent creates
pub const DISK_NAME_PREFIX: &str = "gvb";

const RUN_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const RUN_ID_LEN: usize = 4;

// =============================================================================
// Run Identifier
// =============================================================================

/// Short random token namespacing the disks created by one process run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run identifier
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..RUN_ID_LEN)
            .map(|_| RUN_ID_CHARSET[rng.gen_range(0..RUN_ID_CHARSET.len())] as char)
            .collect();
        Self(id)
    }

    /// Name of the `index`th disk in this run
    pub fn disk_name(&self, index: usize) -> String {
        format!("{}-{}-{}", DISK_NAME_PREFIX, self.0, index)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// A disk created by this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Disk name, also used as the attached device name
    pub name: String,
    /// Self link of the disk resource
    pub url: String,
}

/// Bus interface a disk is attached with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiskInterface {
    Scsi,
}

impl std::fmt::Display for DiskInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskInterface::Scsi => write!(f, "SCSI"),
        }
    }
}

/// Request body for a disk insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    pub name: String,
    /// Size in GB, serialized as a string the way the API encodes int64
    #[serde(with = "int64_string")]
    pub size_gb: u64,
    /// Full disk type URL
    #[serde(rename = "type")]
    pub disk_type: String,
}

/// Request body for an attachDisk call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub source: String,
    pub device_name: String,
    pub interface: DiskInterface,
}

// =============================================================================
// Remote Operations
// =============================================================================

/// Handle to an in-flight zone operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
}

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single error entry reported by an operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationErrorEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Error block of a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorEntry>,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "operation reported an error");
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Snapshot of a zone operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub target_link: String,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl OperationStatus {
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }

    pub fn handle(&self) -> OperationHandle {
        OperationHandle::new(self.name.clone())
    }
}

// =============================================================================
// Compute API Port
// =============================================================================

/// Port for the zonal compute API
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Submit a disk insert; returns the operation tracking it
    async fn insert_disk(&self, spec: &DiskSpec) -> Result<OperationStatus>;

    /// Fetch the current state of a zone operation
    async fn get_zone_operation(&self, operation: &OperationHandle) -> Result<OperationStatus>;

    /// Attach a disk to an instance
    async fn attach_disk(&self, instance: &str, request: &AttachRequest) -> Result<OperationStatus>;

    /// Project the client operates in
    fn project(&self) -> &str;

    /// Zone the client operates in
    fn zone(&self) -> &str;

    /// Full URL of a disk type in this project/zone
    fn disk_type_url(&self, disk_type: &str) -> String {
        format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/diskTypes/{}",
            self.project(),
            self.zone(),
            disk_type
        )
    }
}

// =============================================================================
// Instance Metadata Port
// =============================================================================

/// Port for the instance metadata service
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    /// Zone this instance runs in (e.g. us-central1-a)
    async fn zone(&self) -> Result<String>;

    /// Project identifier this instance belongs to
    async fn project_id(&self) -> Result<String>;

    /// Name of this instance
    async fn instance_name(&self) -> Result<String>;
}

// =============================================================================
// Command Runner Port
// =============================================================================

/// Port for running external OS utilities (mkfs, mount, systemd-run)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments; Ok only on exit status 0
    async fn run(&self, argv: &[String]) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ComputeApiRef = Arc<dyn ComputeApi>;
pub type InstanceMetadataRef = Arc<dyn InstanceMetadata>;
pub type CommandRunnerRef = Arc<dyn CommandRunner>;

mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Num(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Str(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Num(n) => Ok(n),
        }
    }
}
