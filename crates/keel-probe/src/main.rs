//! keel probe entry point.
//!
//! Waits for the bootstrap agent at `KEEL_AGENT_ENDPOINT` to answer ping,
//! then waits for its job to report `running`. Exits non-zero if either
//! wait gives up.

mod config;

use anyhow::Context;
use config::ProbeConfig;
use keel_agent::{
    AgentClient, AttemptRetryStrategy, GetStateRetryable, HttpAgentClient, PingRetryable,
    RetryStrategy, TimeoutRetryStrategy,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("keel=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ProbeConfig::from_env();
    tracing::info!(?config, "Configuration loaded");

    let client = HttpAgentClient::new(config.agent_config()?)?;

    tracing::info!(endpoint = %config.agent_endpoint, "Waiting for the agent");
    TimeoutRetryStrategy::new(config.ready_timeout, config.ready_delay)
        .try_retryable(&mut PingRetryable::new(&client))
        .await
        .context("agent did not answer ping")?;

    tracing::info!("Waiting for the job to be running");
    AttemptRetryStrategy::new(config.running_max_attempts, config.running_delay)
        .try_retryable(&mut GetStateRetryable::new(&client))
        .await
        .context("job did not reach 'running'")?;

    let state = client.get_state().await?;
    tracing::info!(job_state = %state.job_state, "Agent is ready");
    Ok(())
}
