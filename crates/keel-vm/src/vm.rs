//! A deployed VM and the operations the director performs on it.

use crate::cloud::Cloud;
use crate::disk::{Disk, DiskDeployer, DiskPool};
use crate::error::{Result, ResultExt};
use crate::records::{StemcellRepo, VmRepo};
use async_trait::async_trait;
use keel_agent::{
    AgentClient, ApplySpec, AttemptRetryStrategy, GetStateRetryable, PingRetryable,
    RetryStrategy, TimeoutRetryStrategy,
};
use std::sync::Arc;
use std::time::Duration;

/// A VM with a running agent.
#[async_trait]
pub trait Vm: Send + Sync {
    /// Cloud identifier.
    fn cid(&self) -> &str;

    /// Whether the cloud still knows the VM.
    async fn exists(&self) -> Result<bool>;

    /// Ping the agent until it answers or `timeout` elapses.
    async fn wait_until_ready(&self, timeout: Duration, delay: Duration) -> Result<()>;

    /// Start the job's services.
    async fn start(&self) -> Result<()>;

    /// Stop the job's services.
    async fn stop(&self) -> Result<()>;

    /// Send a new apply spec.
    async fn apply(&self, spec: &ApplySpec) -> Result<()>;

    /// Reconcile the persistent disk with `pool`.
    async fn update_disks(&self, pool: &DiskPool) -> Result<Vec<Disk>>;

    /// Poll the agent until the job reports `running`.
    async fn wait_to_be_running(&self, max_attempts: u32, delay: Duration) -> Result<()>;

    /// Attach in the cloud, then mount through the agent.
    async fn attach_disk(&self, disk: &Disk) -> Result<()>;

    /// Detach in the cloud.
    async fn detach_disk(&self, disk: &Disk) -> Result<()>;

    /// Disks the agent has mounted.
    async fn disks(&self) -> Result<Vec<Disk>>;

    /// Unmount through the agent.
    async fn unmount_disk(&self, disk: &Disk) -> Result<()>;

    /// Copy data from the old persistent disk to the new one.
    async fn migrate_disk(&self) -> Result<()>;

    /// Delete the VM and forget it.
    async fn delete(&self) -> Result<()>;
}

/// [`Vm`] driven through a [`Cloud`] and an [`AgentClient`].
pub struct ManagedVm {
    cid: String,
    vm_repo: Arc<dyn VmRepo>,
    stemcell_repo: Arc<dyn StemcellRepo>,
    disk_deployer: Arc<DiskDeployer>,
    agent: Arc<dyn AgentClient>,
    cloud: Arc<dyn Cloud>,
}

impl std::fmt::Debug for ManagedVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedVm")
            .field("cid", &self.cid)
            .finish_non_exhaustive()
    }
}

impl ManagedVm {
    /// Wrap the VM `cid`.
    pub fn new(
        cid: impl Into<String>,
        vm_repo: Arc<dyn VmRepo>,
        stemcell_repo: Arc<dyn StemcellRepo>,
        disk_deployer: Arc<DiskDeployer>,
        agent: Arc<dyn AgentClient>,
        cloud: Arc<dyn Cloud>,
    ) -> Self {
        Self {
            cid: cid.into(),
            vm_repo,
            stemcell_repo,
            disk_deployer,
            agent,
            cloud,
        }
    }
}

#[async_trait]
impl Vm for ManagedVm {
    fn cid(&self) -> &str {
        &self.cid
    }

    async fn exists(&self) -> Result<bool> {
        self.cloud
            .has_vm(&self.cid)
            .await
            .context(format!("Checking existence of VM '{}'", self.cid))
    }

    async fn wait_until_ready(&self, timeout: Duration, delay: Duration) -> Result<()> {
        tracing::debug!(vm_cid = %self.cid, timeout_ms = timeout.as_millis() as u64, "Waiting for agent");
        let mut ping = PingRetryable::new(self.agent.as_ref());
        TimeoutRetryStrategy::new(timeout, delay)
            .try_retryable(&mut ping)
            .await
            .context(format!("Waiting for the agent on VM '{}'", self.cid))
    }

    async fn start(&self) -> Result<()> {
        tracing::debug!(vm_cid = %self.cid, "Starting agent");
        self.agent.start().await.context("Starting agent")
    }

    async fn stop(&self) -> Result<()> {
        tracing::debug!(vm_cid = %self.cid, "Stopping agent");
        self.agent.stop().await.context("Stopping agent")
    }

    async fn apply(&self, spec: &ApplySpec) -> Result<()> {
        tracing::debug!(vm_cid = %self.cid, deployment = %spec.deployment, "Sending apply message to the agent");
        self.agent
            .apply(spec)
            .await
            .context("Sending apply spec to agent")
    }

    async fn update_disks(&self, pool: &DiskPool) -> Result<Vec<Disk>> {
        self.disk_deployer
            .deploy(pool, self)
            .await
            .context("Deploying disk")
    }

    async fn wait_to_be_running(&self, max_attempts: u32, delay: Duration) -> Result<()> {
        let mut get_state = GetStateRetryable::new(self.agent.as_ref());
        AttemptRetryStrategy::new(max_attempts, delay)
            .try_retryable(&mut get_state)
            .await
            .context(format!("Waiting for jobs on VM '{}' to be running", self.cid))
    }

    async fn attach_disk(&self, disk: &Disk) -> Result<()> {
        self.cloud
            .attach_disk(&self.cid, disk.cid())
            .await
            .context("Attaching disk in the cloud")?;
        self.agent
            .mount_disk(disk.cid())
            .await
            .context("Mounting disk")
    }

    async fn detach_disk(&self, disk: &Disk) -> Result<()> {
        self.cloud
            .detach_disk(&self.cid, disk.cid())
            .await
            .context("Detaching disk in the cloud")
    }

    async fn disks(&self) -> Result<Vec<Disk>> {
        let cids = self.agent.list_disk().await.context("Listing vm disks")?;
        Ok(cids.into_iter().map(Disk::from_cid).collect())
    }

    async fn unmount_disk(&self, disk: &Disk) -> Result<()> {
        self.agent
            .unmount_disk(disk.cid())
            .await
            .context(format!("Unmounting disk '{}'", disk.cid()))
    }

    async fn migrate_disk(&self) -> Result<()> {
        self.agent.migrate_disk().await.context("Migrating disk")
    }

    async fn delete(&self) -> Result<()> {
        tracing::info!(vm_cid = %self.cid, "Deleting VM");
        if let Err(e) = self.cloud.delete_vm(&self.cid).await {
            if !e.is_not_found() {
                return Err(e).context("Deleting vm in the cloud");
            }
            tracing::warn!(vm_cid = %self.cid, error = %e, "VM already gone from the cloud");
        }

        self.vm_repo
            .clear_current()
            .await
            .context("Deleting vm from vm repo")?;
        self.stemcell_repo
            .clear_current()
            .await
            .context("Clearing current stemcell from stemcell repo")
    }
}
