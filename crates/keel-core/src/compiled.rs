//! Cache of compiled packages, keyed by fingerprint.

use crate::error::Result;
use crate::release::Package;
use async_trait::async_trait;
use keel_agent::BlobRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Where a compiled package was stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledPackageRecord {
    /// Blobstore identifier of the compiled archive.
    pub blob_id: String,
    /// SHA1 of the compiled archive.
    pub blob_sha1: String,
}

/// A compiled package as referenced by an apply spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledPackageRef {
    /// Package name.
    pub name: String,
    /// Package fingerprint.
    pub version: String,
    /// SHA1 of the compiled archive.
    pub sha1: String,
    /// Blobstore identifier of the compiled archive.
    pub blobstore_id: String,
}

impl CompiledPackageRef {
    /// Ref for `package` compiled into `record`.
    pub fn new(package: &Package, record: &CompiledPackageRecord) -> Self {
        Self {
            name: package.name.clone(),
            version: package.fingerprint.clone(),
            sha1: record.blob_sha1.clone(),
            blobstore_id: record.blob_id.clone(),
        }
    }
}

impl From<CompiledPackageRef> for BlobRef {
    fn from(r: CompiledPackageRef) -> Self {
        BlobRef {
            name: r.name,
            version: r.version,
            sha1: r.sha1,
            blobstore_id: r.blobstore_id,
        }
    }
}

/// Storage for compiled package records.
#[async_trait]
pub trait CompiledPackageRepo: Send + Sync {
    /// Remember that `package` compiled into `record`.
    async fn save(&self, package: &Package, record: &CompiledPackageRecord) -> Result<()>;

    /// The compiled record for `package`'s fingerprint, if any.
    async fn find(&self, package: &Package) -> Result<Option<CompiledPackageRecord>>;
}

/// In-memory [`CompiledPackageRepo`].
#[derive(Debug, Default)]
pub struct InMemoryCompiledPackageRepo {
    records: RwLock<HashMap<String, CompiledPackageRecord>>,
}

impl InMemoryCompiledPackageRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached packages.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CompiledPackageRepo for InMemoryCompiledPackageRepo {
    async fn save(&self, package: &Package, record: &CompiledPackageRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(package.fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, package: &Package) -> Result<Option<CompiledPackageRecord>> {
        Ok(self.records.read().await.get(&package.fingerprint).cloned())
    }
}
