//! Reconcile an instance's persistent disk with its disk pool.
//!
//! The deployer holds no state of its own; each call re-derives where the
//! instance stands from the current disk record:
//!
//! ```text
//!  no disk ──create──▶ attach ──▶ mark current
//!  one disk ──attach──▶ matches pool? ──yes──▶ done
//!                              │ no
//!                              ▼
//!        create new ─▶ attach new ─▶ migrate data ─▶ mark new current
//!                                           ─▶ detach old ─▶ delete old
//! ```
//!
//! The current pointer moves to the new disk before the old one is detached
//! or deleted. A crash in between leaves the old disk unreferenced, and the
//! closing `delete_unused` of the next run removes it.

use super::{Disk, DiskManager, DiskPool};
use crate::error::{Result, ResultExt, VmError};
use crate::records::DiskRepo;
use crate::vm::Vm;
use std::sync::Arc;

/// Creates, attaches and migrates persistent disks.
pub struct DiskDeployer {
    manager: Arc<dyn DiskManager>,
    repo: Arc<dyn DiskRepo>,
}

impl DiskDeployer {
    /// Create a deployer.
    pub fn new(manager: Arc<dyn DiskManager>, repo: Arc<dyn DiskRepo>) -> Self {
        Self { manager, repo }
    }

    /// Bring `vm`'s persistent disk in line with `pool`.
    ///
    /// Returns the disks that are part of the deployment afterwards: empty
    /// when the pool asks for no disk, otherwise the single current disk.
    /// Failures return immediately without rollback; re-running is safe.
    pub async fn deploy(&self, pool: &DiskPool, vm: &dyn Vm) -> Result<Vec<Disk>> {
        if pool.disk_size == 0 {
            return Ok(Vec::new());
        }

        let mut existing = self
            .manager
            .find_current()
            .await
            .context("Finding existing disk")?;

        let disk = match existing.len() {
            0 => self.deploy_new_disk(pool, vm).await?,
            1 => {
                let disk = existing.remove(0);
                self.deploy_existing_disk(disk, pool, vm).await?
            }
            n => {
                return Err(VmError::DiskLifecycle(format!(
                    "Multiple current disks not supported, found {n}"
                )))
            }
        };

        self.manager
            .delete_unused()
            .await
            .context("Deleting unused disks")?;

        Ok(vec![disk])
    }

    async fn deploy_existing_disk(&self, disk: Disk, pool: &DiskPool, vm: &dyn Vm) -> Result<Disk> {
        // the disk should already be attached; attaching again is harmless
        self.attach_disk(&disk, vm).await?;

        if !disk.needs_migration(pool.disk_size, &pool.cloud_properties) {
            tracing::debug!(disk_cid = disk.cid(), "Disk matches pool, nothing to migrate");
            return Ok(disk);
        }
        self.migrate_disk(disk, pool, vm).await
    }

    async fn deploy_new_disk(&self, pool: &DiskPool, vm: &dyn Vm) -> Result<Disk> {
        let disk = self.create_disk(pool, vm).await?;
        self.attach_disk(&disk, vm).await?;
        self.update_current_disk_record(&disk).await?;
        Ok(disk)
    }

    async fn migrate_disk(&self, original: Disk, pool: &DiskPool, vm: &dyn Vm) -> Result<Disk> {
        tracing::info!(
            disk_cid = original.cid(),
            from_size = original.size(),
            to_size = pool.disk_size,
            "Migrating disk"
        );

        let new_disk = self.create_disk(pool, vm).await?;
        self.attach_disk(&new_disk, vm).await?;

        tracing::info!(from = original.cid(), to = new_disk.cid(), "Migrating disk content");
        vm.migrate_disk().await.context(format!(
            "Migrating disk content from '{}' to '{}'",
            original.cid(),
            new_disk.cid()
        ))?;

        self.update_current_disk_record(&new_disk).await?;

        tracing::info!(disk_cid = original.cid(), vm_cid = vm.cid(), "Detaching disk");
        vm.detach_disk(&original)
            .await
            .context(format!("Detaching disk '{}'", original.cid()))?;

        self.manager
            .delete(&original)
            .await
            .context(format!("Deleting disk '{}'", original.cid()))?;

        Ok(new_disk)
    }

    async fn create_disk(&self, pool: &DiskPool, vm: &dyn Vm) -> Result<Disk> {
        self.manager
            .create(pool, vm.cid())
            .await
            .context("Creating disk")
    }

    async fn attach_disk(&self, disk: &Disk, vm: &dyn Vm) -> Result<()> {
        tracing::info!(disk_cid = disk.cid(), vm_cid = vm.cid(), "Attaching disk");
        vm.attach_disk(disk).await.context(format!(
            "Attaching disk '{}' to VM '{}'",
            disk.cid(),
            vm.cid()
        ))
    }

    async fn update_current_disk_record(&self, disk: &Disk) -> Result<()> {
        let record = self
            .repo
            .find(disk.cid())
            .await
            .context("Finding disk record")?
            .ok_or_else(|| {
                VmError::DiskLifecycle(format!(
                    "Failed to find disk record for new disk '{}'",
                    disk.cid()
                ))
            })?;

        self.repo
            .update_current(&record.id)
            .await
            .context("Updating current disk record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudProperties;
    use crate::fakes::{CallLog, FakeDiskManager, FakeVm};
    use crate::records::InMemoryDiskRepo;
    use serde_json::json;

    struct Fixture {
        calls: CallLog,
        repo: Arc<InMemoryDiskRepo>,
        manager: Arc<FakeDiskManager>,
        vm: FakeVm,
        deployer: DiskDeployer,
    }

    fn fixture() -> Fixture {
        let calls = CallLog::default();
        let repo = Arc::new(InMemoryDiskRepo::new());
        let manager = Arc::new(FakeDiskManager::new(calls.clone(), repo.clone()));
        let vm = FakeVm::new("vm-1", calls.clone());
        let deployer = DiskDeployer::new(manager.clone(), repo.clone());
        Fixture {
            calls,
            repo,
            manager,
            vm,
            deployer,
        }
    }

    fn pool(size: u64) -> DiskPool {
        DiskPool {
            name: "default".into(),
            disk_size: size,
            cloud_properties: json!({"type": "ssd"}).as_object().cloned().unwrap(),
        }
    }

    /// Record `cid` as the instance's current disk with the given size.
    async fn existing_disk(f: &Fixture, cid: &str, size: u64) -> Disk {
        let record = f
            .repo
            .save(cid, size, &pool(size).cloud_properties)
            .await
            .unwrap();
        f.repo.update_current(&record.id).await.unwrap();
        let disk = Disk::from(record);
        f.manager.set_current(vec![disk.clone()]);
        disk
    }

    #[tokio::test]
    async fn test_zero_size_touches_nothing() {
        let f = fixture();
        let disks = f.deployer.deploy(&pool(0), &f.vm).await.unwrap();
        assert!(disks.is_empty());
        assert!(f.calls.take().is_empty());
    }

    #[tokio::test]
    async fn test_no_disk_creates_attaches_and_records() {
        let f = fixture();
        let disks = f.deployer.deploy(&pool(1024), &f.vm).await.unwrap();

        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].cid(), "new-disk-1");
        assert_eq!(
            f.calls.take(),
            vec!["create_disk:1024:vm-1", "attach_disk:new-disk-1", "delete_unused"]
        );
        let current = f.repo.find_current().await.unwrap().unwrap();
        assert_eq!(current.cid, "new-disk-1");
    }

    #[tokio::test]
    async fn test_new_disk_attach_failure_leaves_no_current() {
        let f = fixture();
        f.vm.fail("attach_disk:new-disk-1");

        let err = f.deployer.deploy(&pool(1024), &f.vm).await.unwrap_err();
        assert!(err.to_string().contains("Attaching disk 'new-disk-1'"));
        assert!(f.repo.find_current().await.unwrap().is_none());
        assert_eq!(
            f.calls.take(),
            vec!["create_disk:1024:vm-1", "attach_disk:new-disk-1"]
        );
    }

    #[tokio::test]
    async fn test_existing_disk_without_migration() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;

        let disks = f.deployer.deploy(&pool(1024), &f.vm).await.unwrap();

        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].cid(), "disk-1");
        assert_eq!(f.calls.take(), vec!["attach_disk:disk-1", "delete_unused"]);
    }

    #[tokio::test]
    async fn test_existing_disk_migrates_in_order() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;

        let disks = f.deployer.deploy(&pool(2048), &f.vm).await.unwrap();

        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].cid(), "new-disk-1");
        assert_eq!(disks[0].size(), 2048);
        assert_eq!(
            f.calls.take(),
            vec![
                "attach_disk:disk-1",
                "create_disk:2048:vm-1",
                "attach_disk:new-disk-1",
                "migrate_disk",
                "detach_disk:disk-1",
                "delete_disk:disk-1",
                "delete_unused",
            ]
        );
        let current = f.repo.find_current().await.unwrap().unwrap();
        assert_eq!(current.cid, "new-disk-1");
        assert!(f.repo.find("disk-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migration_on_changed_properties() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;
        let mut desired = pool(1024);
        desired.cloud_properties = CloudProperties::new();

        let disks = f.deployer.deploy(&desired, &f.vm).await.unwrap();
        assert_eq!(disks[0].cid(), "new-disk-1");
    }

    #[tokio::test]
    async fn test_failed_new_attach_keeps_original_current() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;
        f.vm.fail("attach_disk:new-disk-1");

        let err = f.deployer.deploy(&pool(2048), &f.vm).await.unwrap_err();
        assert!(err.to_string().contains("new-disk-1"));

        let calls = f.calls.take();
        assert_eq!(
            calls,
            vec!["attach_disk:disk-1", "create_disk:2048:vm-1", "attach_disk:new-disk-1"]
        );
        assert!(!calls.iter().any(|c| c == "migrate_disk" || c.starts_with("detach_disk")));
        let current = f.repo.find_current().await.unwrap().unwrap();
        assert_eq!(current.cid, "disk-1");
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_both_disks() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;
        f.vm.fail("migrate_disk");

        assert!(f.deployer.deploy(&pool(2048), &f.vm).await.is_err());

        let current = f.repo.find_current().await.unwrap().unwrap();
        assert_eq!(current.cid, "disk-1");
        assert!(f.repo.find("new-disk-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_detach_after_pointer_swap() {
        let f = fixture();
        existing_disk(&f, "disk-1", 1024).await;
        f.vm.fail("detach_disk:disk-1");

        assert!(f.deployer.deploy(&pool(2048), &f.vm).await.is_err());

        // new disk is already current; the old one is left for delete_unused
        let current = f.repo.find_current().await.unwrap().unwrap();
        assert_eq!(current.cid, "new-disk-1");
        assert!(f.repo.find("disk-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_multiple_current_disks_is_error() {
        let f = fixture();
        f.manager
            .set_current(vec![Disk::from_cid("disk-1"), Disk::from_cid("disk-2")]);

        let err = f.deployer.deploy(&pool(1024), &f.vm).await.unwrap_err();
        assert!(err.to_string().contains("Multiple current disks not supported"));
        assert!(f.calls.take().is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_for_new_disk() {
        let f = fixture();
        // a repo that never saw the created disk
        let deployer = DiskDeployer::new(f.manager.clone(), Arc::new(InMemoryDiskRepo::new()));

        let err = deployer.deploy(&pool(1024), &f.vm).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Failed to find disk record for new disk"));
    }
}
