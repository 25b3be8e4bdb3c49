//! Recording fakes shared by the unit tests.

use crate::blobstore::Blobstore;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use keel_agent::{AgentClient, AgentError, AgentState, ApplySpec, BlobRef};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Blobstore that hands out `blob-<path>` ids.
#[derive(Default)]
pub(crate) struct FakeBlobstore {
    added: Mutex<Vec<String>>,
}

impl FakeBlobstore {
    pub(crate) fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl Blobstore for FakeBlobstore {
    async fn add(&self, path: &Path) -> Result<String> {
        let path = path.display().to_string();
        self.added.lock().unwrap().push(path.clone());
        Ok(format!("blob-{path}"))
    }

    async fn get(&self, blob_id: &str, _dest: &Path) -> Result<()> {
        Err(CoreError::Blobstore(format!("fake blobstore cannot fetch '{blob_id}'")))
    }
}

/// Agent that records compile requests and answers with
/// `compiled-<name>` blobs.
#[derive(Default)]
pub(crate) struct RecordingAgent {
    compiles: Mutex<Vec<(BlobRef, Vec<BlobRef>)>>,
    failing: AtomicBool,
}

impl RecordingAgent {
    pub(crate) fn compiles(&self) -> Vec<(BlobRef, Vec<BlobRef>)> {
        self.compiles.lock().unwrap().clone()
    }

    pub(crate) fn compiled_names(&self) -> Vec<String> {
        self.compiles()
            .into_iter()
            .map(|(source, _)| source.name)
            .collect()
    }

    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentClient for RecordingAgent {
    async fn ping(&self) -> keel_agent::Result<String> {
        Ok("pong".into())
    }
    async fn start(&self) -> keel_agent::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> keel_agent::Result<()> {
        Ok(())
    }
    async fn apply(&self, _spec: &ApplySpec) -> keel_agent::Result<()> {
        Ok(())
    }
    async fn get_state(&self) -> keel_agent::Result<AgentState> {
        Ok(AgentState {
            job_state: "running".into(),
        })
    }
    async fn list_disk(&self) -> keel_agent::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn mount_disk(&self, _disk_cid: &str) -> keel_agent::Result<()> {
        Ok(())
    }
    async fn unmount_disk(&self, _disk_cid: &str) -> keel_agent::Result<()> {
        Ok(())
    }
    async fn migrate_disk(&self) -> keel_agent::Result<()> {
        Ok(())
    }

    async fn compile_package(
        &self,
        source: &BlobRef,
        dependencies: &[BlobRef],
    ) -> keel_agent::Result<BlobRef> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::AgentException {
                message: "compilation failed".into(),
            });
        }
        self.compiles
            .lock()
            .unwrap()
            .push((source.clone(), dependencies.to_vec()));
        Ok(BlobRef {
            name: source.name.clone(),
            version: source.version.clone(),
            sha1: format!("compiled-sha1-{}", source.name),
            blobstore_id: format!("compiled-{}", source.name),
        })
    }
}
