//! Cloud provider interface.
//!
//! [`Cloud`] is the seam to whatever provisions VMs and disks. Implementations
//! report failures as [`CloudError`] so callers can tell "already gone" apart
//! from real failures when deleting.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Free-form provider properties (instance type, disk type, ...).
pub type CloudProperties = Map<String, Value>;

/// Metadata tags applied to a VM.
pub type VmMetadata = BTreeMap<String, String>;

/// Category of a cloud failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudErrorKind {
    /// The VM does not exist.
    VmNotFound,
    /// The disk does not exist.
    DiskNotFound,
    /// The provider does not support the call.
    NotImplemented,
    /// Anything else.
    Other,
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::VmNotFound => "VMNotFound",
            Self::DiskNotFound => "DiskNotFound",
            Self::NotImplemented => "NotImplemented",
            Self::Other => "Unknown",
        };
        f.write_str(kind)
    }
}

/// Error reported by a [`Cloud`] implementation.
#[derive(Debug, Clone, Error)]
#[error("cloud '{method}' failed ({kind}): {message}")]
pub struct CloudError {
    /// Category of the failure
    pub kind: CloudErrorKind,
    /// Provider method that failed
    pub method: String,
    /// Provider message
    pub message: String,
}

impl CloudError {
    /// Create a new cloud error.
    pub fn new(kind: CloudErrorKind, method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: method.into(),
            message: message.into(),
        }
    }

    /// True for VM or disk not-found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, CloudErrorKind::VmNotFound | CloudErrorKind::DiskNotFound)
    }
}

/// VM and disk provisioning operations.
#[async_trait]
pub trait Cloud: Send + Sync {
    /// Create a VM and return its CID.
    async fn create_vm(
        &self,
        agent_id: &str,
        stemcell_cid: &str,
        cloud_properties: &CloudProperties,
        disk_cids: &[String],
        networks: &Map<String, Value>,
        env: &Map<String, Value>,
    ) -> Result<String, CloudError>;

    /// Tag a VM.
    async fn set_vm_metadata(&self, vm_cid: &str, metadata: &VmMetadata) -> Result<(), CloudError>;

    /// Whether the VM exists.
    async fn has_vm(&self, vm_cid: &str) -> Result<bool, CloudError>;

    /// Delete a VM.
    async fn delete_vm(&self, vm_cid: &str) -> Result<(), CloudError>;

    /// Create a disk near `vm_cid` and return its CID.
    async fn create_disk(
        &self,
        size: u64,
        cloud_properties: &CloudProperties,
        vm_cid: &str,
    ) -> Result<String, CloudError>;

    /// Attach a disk to a VM.
    async fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<(), CloudError>;

    /// Detach a disk from a VM.
    async fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> Result<(), CloudError>;

    /// Delete a disk.
    async fn delete_disk(&self, disk_cid: &str) -> Result<(), CloudError>;
}
