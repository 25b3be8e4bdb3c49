//! Desired-state document sent with `apply`.

use crate::protocol::BlobRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Full instance spec the agent converges to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplySpec {
    /// Deployment name.
    pub deployment: String,
    /// Instance index within the job.
    pub index: u32,
    /// Compiled packages keyed by package name.
    pub packages: BTreeMap<String, BlobRef>,
    /// Job to run.
    pub job: JobSpec,
    /// Network settings, passed through verbatim.
    pub networks: Map<String, Value>,
    /// Archive holding the rendered job templates.
    pub rendered_templates_archive: RenderedTemplatesArchiveSpec,
    /// Hash of the rendered configuration.
    pub configuration_hash: String,
}

/// Job section of an [`ApplySpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Job name.
    pub name: String,
    /// Job templates.
    pub templates: Vec<BlobRef>,
}

/// Location of the rendered templates archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedTemplatesArchiveSpec {
    /// Blobstore identifier.
    pub blobstore_id: String,
    /// SHA1 of the archive.
    pub sha1: String,
}
