//! Agent client configuration types.

use crate::error::AgentError;
use std::time::Duration;

/// Configuration for an [`HttpAgentClient`](crate::HttpAgentClient).
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Base URL of the agent, without the `/agent` suffix.
    pub endpoint: String,
    /// Director identifier sent as `reply_to`.
    pub director_id: String,
    /// Delay between `get_task` polls (default: 500ms).
    pub task_poll_delay: Duration,
    /// Give up polling a task after this long. `None` polls until the agent
    /// reports a terminal state.
    pub task_timeout: Option<Duration>,
    /// Timeout for a single HTTP request (default: 30s).
    pub request_timeout: Duration,
    /// Accept the agent's self-signed certificate (default: true).
    pub accept_invalid_certs: bool,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            director_id: "keel".to_string(),
            task_poll_delay: Duration::from_millis(500),
            task_timeout: None,
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
        }
    }
}

impl AgentClientConfig {
    /// Create a new config builder.
    pub fn builder() -> AgentClientConfigBuilder {
        AgentClientConfigBuilder::default()
    }

    /// URL every request is posted to.
    pub fn agent_url(&self) -> String {
        format!("{}/agent", self.endpoint.trim_end_matches('/'))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.endpoint.is_empty() {
            return Err(AgentError::Config("endpoint is required".into()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(AgentError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(AgentError::Config("request_timeout must be > 0".into()));
        }
        if self.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AgentError::Config("task_timeout must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for AgentClientConfig.
#[derive(Debug, Default)]
pub struct AgentClientConfigBuilder {
    config: AgentClientConfig,
}

impl AgentClientConfigBuilder {
    /// Set the agent endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the director id.
    pub fn director_id(mut self, id: impl Into<String>) -> Self {
        self.config.director_id = id.into();
        self
    }

    /// Set the delay between task polls.
    pub fn task_poll_delay(mut self, delay: Duration) -> Self {
        self.config.task_poll_delay = delay;
        self
    }

    /// Bound task polling by a deadline.
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task_timeout = Some(timeout);
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Accept or reject invalid TLS certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(self) -> Result<AgentClientConfig, AgentError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
