//! Disk creation, lookup and garbage collection.

use super::{Disk, DiskPool};
use crate::cloud::Cloud;
use crate::error::{Result, ResultExt};
use crate::records::DiskRepo;
use async_trait::async_trait;
use std::sync::Arc;

/// Cloud disks paired with their records.
#[async_trait]
pub trait DiskManager: Send + Sync {
    /// Disks currently in use by the instance.
    async fn find_current(&self) -> Result<Vec<Disk>>;

    /// Create a disk for `vm_cid` as described by `pool` and record it.
    async fn create(&self, pool: &DiskPool, vm_cid: &str) -> Result<Disk>;

    /// Delete a disk in the cloud and forget its record.
    async fn delete(&self, disk: &Disk) -> Result<()>;

    /// Recorded disks that are not current.
    async fn find_unused(&self) -> Result<Vec<Disk>>;

    /// Delete every recorded disk that is not current.
    async fn delete_unused(&self) -> Result<()>;
}

/// [`DiskManager`] backed by a [`Cloud`] and a [`DiskRepo`].
pub struct CloudDiskManager {
    cloud: Arc<dyn Cloud>,
    repo: Arc<dyn DiskRepo>,
}

impl CloudDiskManager {
    /// Create a manager.
    pub fn new(cloud: Arc<dyn Cloud>, repo: Arc<dyn DiskRepo>) -> Self {
        Self { cloud, repo }
    }
}

#[async_trait]
impl DiskManager for CloudDiskManager {
    async fn find_current(&self) -> Result<Vec<Disk>> {
        let current = self
            .repo
            .find_current()
            .await
            .context("Reading current disk record")?;
        Ok(current.into_iter().map(Disk::from).collect())
    }

    async fn create(&self, pool: &DiskPool, vm_cid: &str) -> Result<Disk> {
        tracing::info!(vm_cid, size = pool.disk_size, "Creating disk");
        let cid = self
            .cloud
            .create_disk(pool.disk_size, &pool.cloud_properties, vm_cid)
            .await
            .context(format!("Creating {} MiB disk for VM '{vm_cid}'", pool.disk_size))?;

        let record = self
            .repo
            .save(&cid, pool.disk_size, &pool.cloud_properties)
            .await
            .context(format!("Saving record for disk '{cid}'"))?;
        Ok(Disk::from(record))
    }

    async fn delete(&self, disk: &Disk) -> Result<()> {
        tracing::info!(disk_cid = disk.cid(), "Deleting disk");
        if let Err(e) = self.cloud.delete_disk(disk.cid()).await {
            if !e.is_not_found() {
                return Err(e).context(format!("Deleting disk '{}' in the cloud", disk.cid()));
            }
            tracing::warn!(disk_cid = disk.cid(), error = %e, "Disk already gone from the cloud");
        }

        let record = self
            .repo
            .find(disk.cid())
            .await
            .context(format!("Finding record for disk '{}'", disk.cid()))?;
        if let Some(record) = record {
            self.repo
                .delete(&record)
                .await
                .context(format!("Deleting record for disk '{}'", disk.cid()))?;
        }
        Ok(())
    }

    async fn find_unused(&self) -> Result<Vec<Disk>> {
        let records = self.repo.all().await.context("Getting all disk records")?;
        let current_id = self
            .repo
            .find_current()
            .await
            .context("Finding current disk record")?
            .map(|r| r.id);

        Ok(records
            .into_iter()
            .filter(|r| current_id.as_deref() != Some(r.id.as_str()))
            .map(Disk::from)
            .collect())
    }

    async fn delete_unused(&self) -> Result<()> {
        let unused = self.find_unused().await.context("Finding unused disks")?;
        for disk in &unused {
            self.delete(disk)
                .await
                .context(format!("Deleting unused disk '{}'", disk.cid()))?;
        }
        Ok(())
    }
}
