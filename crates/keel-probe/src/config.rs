//! Configuration for the probe.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use keel_agent::{AgentClientConfig, AgentError};
use std::time::Duration;

/// Configuration for the keel probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Agent base URL.
    pub agent_endpoint: String,

    /// Director id sent as `reply_to`.
    pub director_id: String,

    /// Delay between `get_task` polls.
    pub task_poll_delay: Duration,

    /// Deadline for a single agent task. `None` polls until it finishes.
    pub task_timeout: Option<Duration>,

    /// How long to wait for the agent to answer ping.
    pub ready_timeout: Duration,

    /// Delay between pings.
    pub ready_delay: Duration,

    /// How many times to ask for the job state before giving up.
    pub running_max_attempts: u32,

    /// Delay between job state queries.
    pub running_delay: Duration,

    /// Accept the agent's self-signed certificate.
    pub insecure_tls: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: "https://127.0.0.1:6868".to_string(),
            director_id: "keel".to_string(),
            task_poll_delay: Duration::from_millis(500),
            task_timeout: None,
            ready_timeout: Duration::from_secs(600),
            ready_delay: Duration::from_millis(500),
            running_max_attempts: 60,
            running_delay: Duration::from_secs(5),
            insecure_tls: true,
        }
    }
}

impl ProbeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `KEEL_AGENT_ENDPOINT` | `https://127.0.0.1:6868` |
    /// | `KEEL_DIRECTOR_ID` | `keel` |
    /// | `KEEL_TASK_POLL_DELAY_MS` | `500` |
    /// | `KEEL_TASK_TIMEOUT_SECS` | unset (no deadline) |
    /// | `KEEL_READY_TIMEOUT_SECS` | `600` |
    /// | `KEEL_READY_DELAY_MS` | `500` |
    /// | `KEEL_RUNNING_MAX_ATTEMPTS` | `60` |
    /// | `KEEL_RUNNING_DELAY_MS` | `5000` |
    /// | `KEEL_INSECURE_TLS` | `true` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, fallback: Duration| {
            parse(key).map(Duration::from_millis).unwrap_or(fallback)
        };

        Self {
            agent_endpoint: lookup("KEEL_AGENT_ENDPOINT").unwrap_or(default.agent_endpoint),
            director_id: lookup("KEEL_DIRECTOR_ID").unwrap_or(default.director_id),
            task_poll_delay: millis("KEEL_TASK_POLL_DELAY_MS", default.task_poll_delay),
            task_timeout: parse("KEEL_TASK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .or(default.task_timeout),
            ready_timeout: parse("KEEL_READY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.ready_timeout),
            ready_delay: millis("KEEL_READY_DELAY_MS", default.ready_delay),
            running_max_attempts: lookup("KEEL_RUNNING_MAX_ATTEMPTS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default.running_max_attempts),
            running_delay: millis("KEEL_RUNNING_DELAY_MS", default.running_delay),
            insecure_tls: lookup("KEEL_INSECURE_TLS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default.insecure_tls),
        }
    }

    /// Client configuration for the agent.
    pub fn agent_config(&self) -> Result<AgentClientConfig, AgentError> {
        let mut builder = AgentClientConfig::builder()
            .endpoint(self.agent_endpoint.clone())
            .director_id(self.director_id.clone())
            .task_poll_delay(self.task_poll_delay)
            .accept_invalid_certs(self.insecure_tls);
        if let Some(timeout) = self.task_timeout {
            builder = builder.task_timeout(timeout);
        }
        builder.build()
    }
}
