//! Compiling a single package on the agent.

use crate::blobstore::Blobstore;
use crate::compiled::{CompiledPackageRecord, CompiledPackageRepo};
use crate::error::{CoreError, Result, ResultExt};
use crate::release::{PackageGraph, PackageId};
use async_trait::async_trait;
use keel_agent::{AgentClient, BlobRef};
use std::sync::Arc;

/// Turns a source package into a compiled one.
#[async_trait]
pub trait PackageCompiler: Send + Sync {
    /// Compile `id`. Its immediate dependencies must already be compiled.
    async fn compile(&self, graph: &PackageGraph, id: PackageId) -> Result<CompiledPackageRecord>;
}

/// Compiles on the agent VM, uploading sources through the blobstore.
pub struct RemotePackageCompiler {
    blobstore: Arc<dyn Blobstore>,
    agent: Arc<dyn AgentClient>,
    repo: Arc<dyn CompiledPackageRepo>,
}

impl RemotePackageCompiler {
    /// Create a compiler.
    pub fn new(
        blobstore: Arc<dyn Blobstore>,
        agent: Arc<dyn AgentClient>,
        repo: Arc<dyn CompiledPackageRepo>,
    ) -> Self {
        Self {
            blobstore,
            agent,
            repo,
        }
    }

    /// Compiled refs of the immediate dependencies of `id`.
    async fn dependency_refs(&self, graph: &PackageGraph, id: PackageId) -> Result<Vec<BlobRef>> {
        let package = graph.package(id)?;
        let mut refs = Vec::with_capacity(package.dependencies().len());
        for dep_id in package.dependencies() {
            let dep = graph.package(*dep_id)?;
            let record = self
                .repo
                .find(dep)
                .await
                .context(format!("Finding compiled package '{}'", dep.name))?
                .ok_or_else(|| CoreError::DependencyOrdering {
                    package: package.name.clone(),
                    dependency: dep.name.clone(),
                })?;
            refs.push(BlobRef {
                name: dep.name.clone(),
                version: dep.fingerprint.clone(),
                sha1: record.blob_sha1,
                blobstore_id: record.blob_id,
            });
        }
        Ok(refs)
    }
}

#[async_trait]
impl PackageCompiler for RemotePackageCompiler {
    async fn compile(&self, graph: &PackageGraph, id: PackageId) -> Result<CompiledPackageRecord> {
        let package = graph.package(id)?;

        if let Some(record) = self
            .repo
            .find(package)
            .await
            .context(format!("Finding compiled package '{}'", package.name))?
        {
            tracing::debug!(package = %package.name, fingerprint = %package.fingerprint, "Using cached compiled package");
            return Ok(record);
        }

        // dependencies must resolve before the source is uploaded
        let dependencies = self.dependency_refs(graph, id).await?;

        let blob_id = self
            .blobstore
            .add(&package.archive_path)
            .await
            .context(format!("Uploading source of package '{}'", package.name))?;
        let source = BlobRef {
            name: package.name.clone(),
            version: package.fingerprint.clone(),
            sha1: package.sha1.clone(),
            blobstore_id: blob_id,
        };

        tracing::info!(
            package = %package.name,
            fingerprint = %package.fingerprint,
            dependencies = dependencies.len(),
            "Compiling package on agent"
        );
        let compiled = self
            .agent
            .compile_package(&source, &dependencies)
            .await
            .context(format!("Remotely compiling package '{}'", package.name))?;

        let record = CompiledPackageRecord {
            blob_id: compiled.blobstore_id,
            blob_sha1: compiled.sha1,
        };
        self.repo
            .save(package, &record)
            .await
            .context(format!("Saving compiled package record for '{}'", package.name))?;
        Ok(record)
    }
}
