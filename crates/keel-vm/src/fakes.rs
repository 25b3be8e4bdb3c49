//! Recording fakes shared by the unit tests.

use crate::cloud::{Cloud, CloudError, CloudErrorKind, CloudProperties, VmMetadata};
use crate::disk::{Disk, DiskManager, DiskPool};
use crate::error::{Result, VmError};
use crate::records::{DiskRepo, InMemoryDiskRepo};
use crate::vm::Vm;
use async_trait::async_trait;
use keel_agent::{AgentClient, AgentError, AgentState, ApplySpec, BlobRef};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of calls shared between fakes.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    /// Drain and return the calls recorded so far.
    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub(crate) struct FakeCloud {
    calls: CallLog,
    failures: Mutex<HashMap<String, CloudErrorKind>>,
    next_id: AtomicU32,
    pub(crate) metadata: Mutex<Option<VmMetadata>>,
    pub(crate) vms: Mutex<HashSet<String>>,
}

impl FakeCloud {
    pub(crate) fn new(calls: CallLog) -> Self {
        Self {
            calls,
            failures: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            metadata: Mutex::new(None),
            vms: Mutex::new(HashSet::new()),
        }
    }

    /// Make every call to `method` fail with `kind`.
    pub(crate) fn fail(&self, method: &str, kind: CloudErrorKind) {
        self.failures.lock().unwrap().insert(method.to_string(), kind);
    }

    fn record(&self, method: &str, call: String) -> std::result::Result<(), CloudError> {
        self.calls.push(call);
        match self.failures.lock().unwrap().get(method) {
            Some(kind) => Err(CloudError::new(*kind, method, format!("fake {method} failure"))),
            None => Ok(()),
        }
    }

    fn next_cid(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Cloud for FakeCloud {
    async fn create_vm(
        &self,
        _agent_id: &str,
        stemcell_cid: &str,
        _cloud_properties: &CloudProperties,
        _disk_cids: &[String],
        _networks: &Map<String, Value>,
        _env: &Map<String, Value>,
    ) -> std::result::Result<String, CloudError> {
        self.record("create_vm", format!("create_vm:{stemcell_cid}"))?;
        let cid = self.next_cid("vm");
        self.vms.lock().unwrap().insert(cid.clone());
        Ok(cid)
    }

    async fn set_vm_metadata(
        &self,
        vm_cid: &str,
        metadata: &VmMetadata,
    ) -> std::result::Result<(), CloudError> {
        self.record("set_vm_metadata", format!("set_vm_metadata:{vm_cid}"))?;
        *self.metadata.lock().unwrap() = Some(metadata.clone());
        Ok(())
    }

    async fn has_vm(&self, vm_cid: &str) -> std::result::Result<bool, CloudError> {
        self.record("has_vm", format!("has_vm:{vm_cid}"))?;
        Ok(self.vms.lock().unwrap().contains(vm_cid))
    }

    async fn delete_vm(&self, vm_cid: &str) -> std::result::Result<(), CloudError> {
        self.record("delete_vm", format!("delete_vm:{vm_cid}"))?;
        self.vms.lock().unwrap().remove(vm_cid);
        Ok(())
    }

    async fn create_disk(
        &self,
        size: u64,
        _cloud_properties: &CloudProperties,
        vm_cid: &str,
    ) -> std::result::Result<String, CloudError> {
        self.record("create_disk", format!("create_disk:{size}:{vm_cid}"))?;
        Ok(self.next_cid("disk"))
    }

    async fn attach_disk(&self, vm_cid: &str, disk_cid: &str) -> std::result::Result<(), CloudError> {
        self.record("attach_disk", format!("attach_disk:{vm_cid}:{disk_cid}"))
    }

    async fn detach_disk(&self, vm_cid: &str, disk_cid: &str) -> std::result::Result<(), CloudError> {
        self.record("detach_disk", format!("detach_disk:{vm_cid}:{disk_cid}"))
    }

    async fn delete_disk(&self, disk_cid: &str) -> std::result::Result<(), CloudError> {
        self.record("delete_disk", format!("delete_disk:{disk_cid}"))
    }
}

pub(crate) struct FakeAgent {
    calls: CallLog,
    failures: Mutex<HashSet<String>>,
    pub(crate) disks: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub(crate) fn new(calls: CallLog) -> Self {
        Self {
            calls,
            failures: Mutex::new(HashSet::new()),
            disks: Mutex::new(Vec::new()),
        }
    }

    /// Make every call to `method` fail with an agent exception.
    pub(crate) fn fail(&self, method: &str) {
        self.failures.lock().unwrap().insert(method.to_string());
    }

    fn record(&self, method: &str, call: String) -> keel_agent::Result<()> {
        self.calls.push(call);
        if self.failures.lock().unwrap().contains(method) {
            return Err(AgentError::AgentException {
                message: format!("fake {method} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AgentClient for FakeAgent {
    async fn ping(&self) -> keel_agent::Result<String> {
        self.record("ping", "ping".into())?;
        Ok("pong".into())
    }

    async fn start(&self) -> keel_agent::Result<()> {
        self.record("start", "start".into())
    }

    async fn stop(&self) -> keel_agent::Result<()> {
        self.record("stop", "stop".into())
    }

    async fn apply(&self, spec: &ApplySpec) -> keel_agent::Result<()> {
        self.record("apply", format!("apply:{}", spec.deployment))
    }

    async fn get_state(&self) -> keel_agent::Result<AgentState> {
        self.record("get_state", "get_state".into())?;
        Ok(AgentState {
            job_state: "running".into(),
        })
    }

    async fn list_disk(&self) -> keel_agent::Result<Vec<String>> {
        self.record("list_disk", "list_disk".into())?;
        Ok(self.disks.lock().unwrap().clone())
    }

    async fn mount_disk(&self, disk_cid: &str) -> keel_agent::Result<()> {
        self.record("mount_disk", format!("mount_disk:{disk_cid}"))
    }

    async fn unmount_disk(&self, disk_cid: &str) -> keel_agent::Result<()> {
        self.record("unmount_disk", format!("unmount_disk:{disk_cid}"))
    }

    async fn migrate_disk(&self) -> keel_agent::Result<()> {
        self.record("migrate_disk", "migrate_disk".into())
    }

    async fn compile_package(
        &self,
        source: &BlobRef,
        _dependencies: &[BlobRef],
    ) -> keel_agent::Result<BlobRef> {
        self.record("compile_package", format!("compile_package:{}", source.name))?;
        Ok(source.clone())
    }
}

/// Vm fake recording disk operations; a call string listed in `failures`
/// fails.
pub(crate) struct FakeVm {
    cid: String,
    calls: CallLog,
    failures: Mutex<HashSet<String>>,
}

impl FakeVm {
    pub(crate) fn new(cid: &str, calls: CallLog) -> Self {
        Self {
            cid: cid.to_string(),
            calls,
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Fail the exact call `call`, e.g. `attach_disk:disk-2`.
    pub(crate) fn fail(&self, call: &str) {
        self.failures.lock().unwrap().insert(call.to_string());
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.push(call.clone());
        if self.failures.lock().unwrap().contains(&call) {
            return Err(VmError::Agent(AgentError::AgentException {
                message: format!("fake {call} failure"),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl Vm for FakeVm {
    fn cid(&self) -> &str {
        &self.cid
    }

    async fn exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn wait_until_ready(&self, _timeout: Duration, _delay: Duration) -> Result<()> {
        self.record("wait_until_ready".into())
    }

    async fn start(&self) -> Result<()> {
        self.record("start".into())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop".into())
    }

    async fn apply(&self, _spec: &ApplySpec) -> Result<()> {
        self.record("apply".into())
    }

    async fn update_disks(&self, _pool: &DiskPool) -> Result<Vec<Disk>> {
        self.record("update_disks".into())?;
        Ok(Vec::new())
    }

    async fn wait_to_be_running(&self, _max_attempts: u32, _delay: Duration) -> Result<()> {
        self.record("wait_to_be_running".into())
    }

    async fn attach_disk(&self, disk: &Disk) -> Result<()> {
        self.record(format!("attach_disk:{}", disk.cid()))
    }

    async fn detach_disk(&self, disk: &Disk) -> Result<()> {
        self.record(format!("detach_disk:{}", disk.cid()))
    }

    async fn disks(&self) -> Result<Vec<Disk>> {
        Ok(Vec::new())
    }

    async fn unmount_disk(&self, disk: &Disk) -> Result<()> {
        self.record(format!("unmount_disk:{}", disk.cid()))
    }

    async fn migrate_disk(&self) -> Result<()> {
        self.record("migrate_disk".into())
    }

    async fn delete(&self) -> Result<()> {
        self.record("delete".into())
    }
}

/// DiskManager fake reporting a fixed set of current disks. Created disks
/// are saved to `repo` so the current pointer can be moved onto them.
pub(crate) struct FakeDiskManager {
    calls: CallLog,
    pub(crate) repo: Arc<InMemoryDiskRepo>,
    current: Mutex<Vec<Disk>>,
    next_id: AtomicU32,
}

impl FakeDiskManager {
    pub(crate) fn new(calls: CallLog, repo: Arc<InMemoryDiskRepo>) -> Self {
        Self {
            calls,
            repo,
            current: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub(crate) fn set_current(&self, disks: Vec<Disk>) {
        *self.current.lock().unwrap() = disks;
    }
}

#[async_trait]
impl DiskManager for FakeDiskManager {
    async fn find_current(&self) -> Result<Vec<Disk>> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn create(&self, pool: &DiskPool, vm_cid: &str) -> Result<Disk> {
        let cid = format!("new-disk-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.calls.push(format!("create_disk:{}:{vm_cid}", pool.disk_size));
        let record = self
            .repo
            .save(&cid, pool.disk_size, &pool.cloud_properties)
            .await?;
        Ok(Disk::from(record))
    }

    async fn delete(&self, disk: &Disk) -> Result<()> {
        self.calls.push(format!("delete_disk:{}", disk.cid()));
        if let Some(record) = self.repo.find(disk.cid()).await? {
            self.repo.delete(&record).await?;
        }
        Ok(())
    }

    async fn find_unused(&self) -> Result<Vec<Disk>> {
        Ok(Vec::new())
    }

    async fn delete_unused(&self) -> Result<()> {
        self.calls.push("delete_unused");
        Ok(())
    }
}
