//! Error types for keel-agent.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for keel-agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while talking to the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The HTTP request could not be performed.
    #[error("performing POST request: {0}")]
    Transport(String),

    /// The agent answered with a non-200 status code.
    #[error("agent responded to '{method}' with non-successful status code: {status}")]
    Status {
        /// RPC method that was sent
        method: String,
        /// HTTP status code
        status: u16,
    },

    /// The agent reported an exception.
    #[error("agent responded with error: {message}")]
    AgentException {
        /// `exception.message` from the response
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("unexpected agent response at '{field}': {reason}")]
    Protocol {
        /// Offending field in the response
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// An async task reported `running` on the last poll.
    #[error("task '{method}' is still running")]
    TaskRunning {
        /// RPC method that created the task
        method: String,
    },

    /// `start` returned something other than `started`.
    #[error("failed to start agent services with response: '{response}'")]
    StartFailed {
        /// Value returned by the agent
        response: String,
    },

    /// `get_state` returned a job state other than `running`.
    #[error("received non-running job state: '{state}'")]
    JobNotRunning {
        /// Job state returned by the agent
        state: String,
    },

    /// A bounded-attempts retry gave up.
    #[error("failed after {attempts} attempts: {source}")]
    AttemptsExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: Box<AgentError>,
    },

    /// A bounded-timeout retry gave up.
    #[error("timed out after {timeout:?} ({attempts} attempts): {source}")]
    RetryTimeout {
        /// Configured deadline
        timeout: Duration,
        /// Number of attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: Box<AgentError>,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An error annotated with what was being attempted.
    #[error("{context}: {source}")]
    Context {
        /// Operation being attempted
        context: String,
        /// Underlying error
        #[source]
        source: Box<AgentError>,
    },
}

impl AgentError {
    /// Wrap this error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn protocol(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Innermost error, skipping context and retry wrappers.
    pub fn root_cause(&self) -> &AgentError {
        match self {
            Self::Context { source, .. }
            | Self::AttemptsExhausted { source, .. }
            | Self::RetryTimeout { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Adds [`AgentError::context`] to results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a description of the operation.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
