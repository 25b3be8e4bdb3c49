//! Error types for keel-vm.

use crate::cloud::CloudError;
use keel_agent::AgentError;
use thiserror::Error;

/// Result type alias for keel-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while managing VMs and disks.
#[derive(Debug, Error)]
pub enum VmError {
    /// Error from the agent client
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Error from the cloud provider
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Record repository failure
    #[error("record repository: {0}")]
    Repo(String),

    /// The disk state cannot be reconciled
    #[error("{0}")]
    DiskLifecycle(String),

    /// An error annotated with what was being attempted.
    #[error("{context}: {source}")]
    Context {
        /// Operation being attempted
        context: String,
        /// Underlying error
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    /// Wrap this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root_cause(&self) -> &VmError {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Adds [`VmError::context`] to results whose error converts into [`VmError`].
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a description of the operation.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<VmError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}
