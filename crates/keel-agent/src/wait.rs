//! Retryables used to wait for the agent to come up.

use crate::client::AgentClient;
use crate::error::AgentError;
use crate::retry::{AttemptError, Retryable};
use async_trait::async_trait;

/// Succeeds once the agent answers a ping. Every failure is retried.
pub struct PingRetryable<'a> {
    client: &'a dyn AgentClient,
}

impl<'a> PingRetryable<'a> {
    /// Ping through `client`.
    pub fn new(client: &'a dyn AgentClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Retryable for PingRetryable<'_> {
    async fn attempt(&mut self) -> Result<(), AttemptError> {
        self.client.ping().await.map(|_| ()).map_err(AttemptError::Retry)
    }
}

/// Succeeds once the agent reports job state `running`.
///
/// Transport and protocol failures are fatal; any other job state is
/// retried.
pub struct GetStateRetryable<'a> {
    client: &'a dyn AgentClient,
}

impl<'a> GetStateRetryable<'a> {
    /// Query state through `client`.
    pub fn new(client: &'a dyn AgentClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Retryable for GetStateRetryable<'_> {
    async fn attempt(&mut self) -> Result<(), AttemptError> {
        let state = self.client.get_state().await.map_err(AttemptError::Abort)?;
        if state.job_state == "running" {
            return Ok(());
        }
        Err(AttemptError::Retry(AgentError::JobNotRunning {
            state: state.job_state,
        }))
    }
}
