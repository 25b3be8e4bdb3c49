//! Persisted records of deployed resources.
//!
//! Each repository tracks at most one "current" record. The in-memory
//! implementations are shared behind `Arc` and guard their state with an
//! async `RwLock`.

use crate::cloud::CloudProperties;
use crate::error::{Result, VmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A disk known to the deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRecord {
    /// Record identifier.
    pub id: String,
    /// Cloud identifier of the disk.
    pub cid: String,
    /// Size in MiB.
    pub size: u64,
    /// Properties the disk was created with.
    pub cloud_properties: CloudProperties,
}

/// Storage for disk records.
#[async_trait]
pub trait DiskRepo: Send + Sync {
    /// The current disk record, if any.
    async fn find_current(&self) -> Result<Option<DiskRecord>>;

    /// Look up a record by disk CID.
    async fn find(&self, cid: &str) -> Result<Option<DiskRecord>>;

    /// Save a new record and return it.
    async fn save(&self, cid: &str, size: u64, cloud_properties: &CloudProperties) -> Result<DiskRecord>;

    /// Mark the record with `id` as current.
    async fn update_current(&self, id: &str) -> Result<()>;

    /// Forget the current pointer.
    async fn clear_current(&self) -> Result<()>;

    /// Delete a record, clearing the current pointer if it pointed there.
    async fn delete(&self, record: &DiskRecord) -> Result<()>;

    /// Every record, in insertion order.
    async fn all(&self) -> Result<Vec<DiskRecord>>;
}

/// Storage for the current VM CID.
#[async_trait]
pub trait VmRepo: Send + Sync {
    /// CID of the current VM, if any.
    async fn find_current(&self) -> Result<Option<String>>;

    /// Record `cid` as the current VM.
    async fn update_current(&self, cid: &str) -> Result<()>;

    /// Forget the current VM.
    async fn clear_current(&self) -> Result<()>;
}

/// Storage for the current stemcell CID.
#[async_trait]
pub trait StemcellRepo: Send + Sync {
    /// CID of the current stemcell, if any.
    async fn find_current(&self) -> Result<Option<String>>;

    /// Record `cid` as the current stemcell.
    async fn update_current(&self, cid: &str) -> Result<()>;

    /// Forget the current stemcell.
    async fn clear_current(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct DiskState {
    records: Vec<DiskRecord>,
    current_id: Option<String>,
}

/// In-memory [`DiskRepo`].
#[derive(Debug, Default)]
pub struct InMemoryDiskRepo {
    state: RwLock<DiskState>,
}

impl InMemoryDiskRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiskRepo for InMemoryDiskRepo {
    async fn find_current(&self) -> Result<Option<DiskRecord>> {
        let state = self.state.read().await;
        Ok(state
            .current_id
            .as_ref()
            .and_then(|id| state.records.iter().find(|r| &r.id == id))
            .cloned())
    }

    async fn find(&self, cid: &str) -> Result<Option<DiskRecord>> {
        let state = self.state.read().await;
        Ok(state.records.iter().find(|r| r.cid == cid).cloned())
    }

    async fn save(&self, cid: &str, size: u64, cloud_properties: &CloudProperties) -> Result<DiskRecord> {
        let record = DiskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            cid: cid.to_string(),
            size,
            cloud_properties: cloud_properties.clone(),
        };
        self.state.write().await.records.push(record.clone());
        tracing::debug!(disk_cid = %cid, record_id = %record.id, "Saved disk record");
        Ok(record)
    }

    async fn update_current(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.records.iter().any(|r| r.id == id) {
            return Err(VmError::Repo(format!(
                "verifying disk record exists with id '{id}'"
            )));
        }
        state.current_id = Some(id.to_string());
        Ok(())
    }

    async fn clear_current(&self) -> Result<()> {
        self.state.write().await.current_id = None;
        Ok(())
    }

    async fn delete(&self, record: &DiskRecord) -> Result<()> {
        let mut state = self.state.write().await;
        state.records.retain(|r| r.id != record.id);
        if state.current_id.as_deref() == Some(record.id.as_str()) {
            state.current_id = None;
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<DiskRecord>> {
        Ok(self.state.read().await.records.clone())
    }
}

/// In-memory [`VmRepo`].
#[derive(Debug, Default)]
pub struct InMemoryVmRepo {
    current: RwLock<Option<String>>,
}

impl InMemoryVmRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VmRepo for InMemoryVmRepo {
    async fn find_current(&self) -> Result<Option<String>> {
        Ok(self.current.read().await.clone())
    }

    async fn update_current(&self, cid: &str) -> Result<()> {
        *self.current.write().await = Some(cid.to_string());
        Ok(())
    }

    async fn clear_current(&self) -> Result<()> {
        *self.current.write().await = None;
        Ok(())
    }
}

/// In-memory [`StemcellRepo`].
#[derive(Debug, Default)]
pub struct InMemoryStemcellRepo {
    current: RwLock<Option<String>>,
}

impl InMemoryStemcellRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StemcellRepo for InMemoryStemcellRepo {
    async fn find_current(&self) -> Result<Option<String>> {
        Ok(self.current.read().await.clone())
    }

    async fn update_current(&self, cid: &str) -> Result<()> {
        *self.current.write().await = Some(cid.to_string());
        Ok(())
    }

    async fn clear_current(&self) -> Result<()> {
        *self.current.write().await = None;
        Ok(())
    }
}
