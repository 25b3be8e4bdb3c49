//! Persistent disks.

mod deployer;
mod manager;

pub use deployer::DiskDeployer;
pub use manager::{CloudDiskManager, DiskManager};

use crate::cloud::CloudProperties;
use crate::records::DiskRecord;
use serde::{Deserialize, Serialize};

/// Desired persistent disk for an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskPool {
    /// Pool name.
    pub name: String,
    /// Size in MiB. Zero means no persistent disk.
    pub disk_size: u64,
    /// Properties passed to the cloud when creating the disk.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A persistent disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    cid: String,
    size: u64,
    cloud_properties: CloudProperties,
}

impl Disk {
    /// Disk with known size and properties.
    pub fn new(cid: impl Into<String>, size: u64, cloud_properties: CloudProperties) -> Self {
        Self {
            cid: cid.into(),
            size,
            cloud_properties,
        }
    }

    /// Disk known only by CID, e.g. as reported by the agent.
    pub fn from_cid(cid: impl Into<String>) -> Self {
        Self::new(cid, 0, CloudProperties::new())
    }

    /// Cloud identifier.
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// Size in MiB.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Properties the disk was created with.
    pub fn cloud_properties(&self) -> &CloudProperties {
        &self.cloud_properties
    }

    /// Whether the disk must be replaced to match the desired size and
    /// properties.
    pub fn needs_migration(&self, size: u64, cloud_properties: &CloudProperties) -> bool {
        self.size != size || &self.cloud_properties != cloud_properties
    }
}

impl From<DiskRecord> for Disk {
    fn from(record: DiskRecord) -> Self {
        Self::new(record.cid, record.size, record.cloud_properties)
    }
}
