//! Error types for keel-core.

use keel_agent::AgentError;
use thiserror::Error;

/// Result type alias for keel-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while compiling packages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from the agent client
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Blobstore upload or download failed
    #[error("blobstore: {0}")]
    Blobstore(String),

    /// Compiled package repository failure
    #[error("compiled package repository: {0}")]
    Repo(String),

    /// A package was reached before one of its dependencies was compiled.
    #[error("Remote compilation failure: Package '{package}' requires package '{dependency}', but it has not been compiled")]
    DependencyOrdering {
        /// Package being compiled
        package: String,
        /// Dependency missing from the cache
        dependency: String,
    },

    /// The dependency graph is not acyclic.
    #[error("dependency cycle among packages: {}", .packages.join(", "))]
    DependencyCycle {
        /// Packages that could not be ordered
        packages: Vec<String>,
    },

    /// A package id that does not belong to the graph.
    #[error("unknown package id {0}")]
    UnknownPackage(usize),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error annotated with what was being attempted.
    #[error("{context}: {source}")]
    Context {
        /// Operation being attempted
        context: String,
        /// Underlying error
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Wrap this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers.
    pub fn root_cause(&self) -> &CoreError {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Adds [`CoreError::context`] to results whose error converts into
/// [`CoreError`].
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a description of the operation.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<CoreError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}
