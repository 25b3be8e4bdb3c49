//! Blob storage for package archives.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Content store shared with the agent.
#[async_trait]
pub trait Blobstore: Send + Sync {
    /// Upload the file at `path` and return its blob id.
    async fn add(&self, path: &Path) -> Result<String>;

    /// Download `blob_id` into `dest`.
    async fn get(&self, blob_id: &str, dest: &Path) -> Result<()>;
}

/// WebDAV-style blobstore: blobs live at `{endpoint}/blobs/{id}`.
pub struct DavBlobstore {
    client: reqwest::Client,
    endpoint: String,
}

impl DavBlobstore {
    /// Create a blobstore client for `endpoint`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| CoreError::Blobstore(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/blobs/{}", self.endpoint, blob_id)
    }
}

#[async_trait]
impl Blobstore for DavBlobstore {
    async fn add(&self, path: &Path) -> Result<String> {
        let body = tokio::fs::read(path).await?;
        let blob_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(blob_id = %blob_id, path = %path.display(), bytes = body.len(), "Uploading blob");

        let response = self
            .client
            .put(self.blob_url(&blob_id))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::Blobstore(format!("uploading '{}': {e}", path.display())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Blobstore(format!(
                "uploading '{}': status {status}",
                path.display()
            )));
        }
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &str, dest: &Path) -> Result<()> {
        tracing::debug!(blob_id, dest = %dest.display(), "Downloading blob");
        let response = self
            .client
            .get(self.blob_url(blob_id))
            .send()
            .await
            .map_err(|e| CoreError::Blobstore(format!("downloading '{blob_id}': {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Blobstore(format!(
                "downloading '{blob_id}': status {status}"
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::Blobstore(format!("reading '{blob_id}': {e}")))?;
        tokio::fs::write(dest, &body).await?;
        Ok(())
    }
}
