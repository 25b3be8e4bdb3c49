//! Creating and finding the deployment's VM.

use crate::cloud::{Cloud, CloudErrorKind, CloudProperties, VmMetadata};
use crate::disk::DiskDeployer;
use crate::error::{Result, ResultExt};
use crate::records::{StemcellRepo, VmRepo};
use crate::vm::ManagedVm;
use keel_agent::AgentClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// What to create a VM with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmSpec {
    /// Deployment name, used for metadata.
    pub deployment: String,
    /// Job name, used for metadata.
    pub job: String,
    /// Resource pool properties for the cloud.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    /// Network settings keyed by network name.
    #[serde(default)]
    pub networks: Map<String, Value>,
    /// Environment passed to the agent.
    #[serde(default)]
    pub env: Map<String, Value>,
}

/// Creates VMs and looks up the current one.
pub struct VmManager {
    vm_repo: Arc<dyn VmRepo>,
    stemcell_repo: Arc<dyn StemcellRepo>,
    disk_deployer: Arc<DiskDeployer>,
    agent: Arc<dyn AgentClient>,
    cloud: Arc<dyn Cloud>,
}

impl VmManager {
    /// Create a manager.
    pub fn new(
        vm_repo: Arc<dyn VmRepo>,
        stemcell_repo: Arc<dyn StemcellRepo>,
        disk_deployer: Arc<DiskDeployer>,
        agent: Arc<dyn AgentClient>,
        cloud: Arc<dyn Cloud>,
    ) -> Self {
        Self {
            vm_repo,
            stemcell_repo,
            disk_deployer,
            agent,
            cloud,
        }
    }

    /// The VM recorded as current, if any.
    pub async fn find_current(&self) -> Result<Option<ManagedVm>> {
        let cid = self
            .vm_repo
            .find_current()
            .await
            .context("Finding currently deployed vm")?;
        Ok(cid.map(|cid| self.vm(cid)))
    }

    /// Create a VM from `stemcell_cid` and record it as current.
    ///
    /// The record is written right after the cloud returns, before anything
    /// else can fail, so a created VM is never forgotten.
    pub async fn create(
        &self,
        stemcell_cid: &str,
        spec: &VmSpec,
        disk_cids: &[String],
    ) -> Result<ManagedVm> {
        let agent_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(stemcell_cid, agent_id = %agent_id, job = %spec.job, "Creating VM");

        let cid = self
            .cloud
            .create_vm(
                &agent_id,
                stemcell_cid,
                &spec.cloud_properties,
                disk_cids,
                &spec.networks,
                &spec.env,
            )
            .await
            .context(format!("Creating vm with stemcell cid '{stemcell_cid}'"))?;

        self.vm_repo
            .update_current(&cid)
            .await
            .context("Updating current vm record")?;

        let metadata = vm_metadata(spec);
        if let Err(e) = self.cloud.set_vm_metadata(&cid, &metadata).await {
            if e.kind != CloudErrorKind::NotImplemented {
                return Err(e).context(format!("Setting metadata on VM '{cid}'"));
            }
            tracing::debug!(vm_cid = %cid, "Cloud does not support VM metadata");
        }

        tracing::info!(vm_cid = %cid, "VM created");
        Ok(self.vm(cid))
    }

    fn vm(&self, cid: String) -> ManagedVm {
        ManagedVm::new(
            cid,
            self.vm_repo.clone(),
            self.stemcell_repo.clone(),
            self.disk_deployer.clone(),
            self.agent.clone(),
            self.cloud.clone(),
        )
    }
}

fn vm_metadata(spec: &VmSpec) -> VmMetadata {
    let mut metadata = VmMetadata::new();
    metadata.insert("deployment".into(), spec.deployment.clone());
    metadata.insert("job".into(), spec.job.clone());
    metadata.insert("index".into(), "0".into());
    metadata.insert("director".into(), "keel".into());
    metadata.insert("name".into(), format!("{}/0", spec.job));
    metadata.insert(
        "created_at".into(),
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    metadata
}
