//! RPC client for the in-VM agent.
//!
//! Synchronous methods are one request each. Asynchronous methods return a
//! task descriptor that is polled with `get_task` until the agent stops
//! reporting it as `running`; the last polled value is the method's result.

use crate::apply_spec::ApplySpec;
use crate::config::AgentClientConfig;
use crate::error::{AgentError, Result, ResultExt};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::protocol::{AgentRequest, AgentResponse, AgentState, BlobRef, TaskValue};
use crate::retry::{
    AttemptError, RetryStrategy, Retryable, TimeoutRetryStrategy, UnlimitedRetryStrategy,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Operations the director performs against the agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Check liveness; returns the agent's reply (normally `pong`).
    async fn ping(&self) -> Result<String>;

    /// Start the job's services.
    async fn start(&self) -> Result<()>;

    /// Stop the job's services and wait for the task to finish.
    async fn stop(&self) -> Result<()>;

    /// Converge the VM to `spec` and wait for the task to finish.
    async fn apply(&self, spec: &ApplySpec) -> Result<()>;

    /// Current job state.
    async fn get_state(&self) -> Result<AgentState>;

    /// CIDs of the disks the agent has mounted.
    async fn list_disk(&self) -> Result<Vec<String>>;

    /// Mount an attached disk.
    async fn mount_disk(&self, disk_cid: &str) -> Result<()>;

    /// Unmount a disk.
    async fn unmount_disk(&self, disk_cid: &str) -> Result<()>;

    /// Copy the persistent data from the old disk to the newly mounted one.
    async fn migrate_disk(&self) -> Result<()>;

    /// Compile `source` against its immediate `dependencies`.
    ///
    /// Returns a ref to the compiled package carrying the source's name and
    /// version.
    async fn compile_package(&self, source: &BlobRef, dependencies: &[BlobRef]) -> Result<BlobRef>;
}

/// [`AgentClient`] speaking JSON over HTTP.
pub struct HttpAgentClient {
    http: Arc<dyn HttpClient>,
    url: String,
    director_id: String,
    task_strategy: Box<dyn RetryStrategy>,
}

impl HttpAgentClient {
    /// Create a client using reqwest for transport.
    pub fn new(config: AgentClientConfig) -> Result<Self> {
        config.validate()?;
        let http = ReqwestHttpClient::new(&config)?;
        Ok(Self::with_http_client(config, Arc::new(http)))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_http_client(config: AgentClientConfig, http: Arc<dyn HttpClient>) -> Self {
        let task_strategy: Box<dyn RetryStrategy> = match config.task_timeout {
            Some(timeout) => Box::new(TimeoutRetryStrategy::new(timeout, config.task_poll_delay)),
            None => Box::new(UnlimitedRetryStrategy::new(config.task_poll_delay)),
        };
        Self {
            http,
            url: config.agent_url(),
            director_id: config.director_id,
            task_strategy,
        }
    }

    /// Send one request and return the response `value`.
    async fn send(&self, method: &str, arguments: &[Value]) -> Result<Option<Value>> {
        let request = AgentRequest {
            method,
            arguments,
            reply_to: &self.director_id,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| AgentError::protocol("arguments", e.to_string()))?;

        tracing::debug!(method, "Sending request to agent");
        tracing::trace!(method, body = %String::from_utf8_lossy(&body), "Agent request body");

        let response = self.http.post(&self.url, body).await?;
        tracing::trace!(
            method,
            status = response.status,
            body = %String::from_utf8_lossy(&response.body),
            "Agent response"
        );

        if response.status != 200 {
            return Err(AgentError::Status {
                method: method.to_string(),
                status: response.status,
            });
        }

        AgentResponse::from_slice(&response.body)?.into_value()
    }

    /// Send an async method and poll `get_task` until it leaves `running`.
    async fn send_async_task(&self, method: &str, arguments: &[Value]) -> Result<TaskValue> {
        let value = self
            .send(method, arguments)
            .await
            .context(format!("Sending '{method}' to the agent"))?
            .ok_or_else(|| AgentError::protocol("value", "missing"))?;
        let task_id = TaskValue::from_value(value)?.task_id()?.to_string();
        tracing::debug!(method, task_id = %task_id, "Agent task started");

        let mut poll = GetTaskRetryable {
            client: self,
            method,
            task_id: &task_id,
            last: None,
        };
        self.task_strategy
            .try_retryable(&mut poll)
            .await
            .context(format!("Waiting for agent task '{task_id}' ({method})"))?;

        poll.last
            .ok_or_else(|| AgentError::protocol("value", "task finished without a value"))
    }
}

/// Polls one task until it is no longer running.
struct GetTaskRetryable<'a> {
    client: &'a HttpAgentClient,
    method: &'a str,
    task_id: &'a str,
    last: Option<TaskValue>,
}

#[async_trait]
impl Retryable for GetTaskRetryable<'_> {
    async fn attempt(&mut self) -> std::result::Result<(), AttemptError> {
        let value = self
            .client
            .send("get_task", &[json!(self.task_id)])
            .await
            .context("Sending 'get_task' to the agent")
            .map_err(AttemptError::Abort)?
            .ok_or_else(|| AttemptError::Abort(AgentError::protocol("value", "missing")))?;

        let task = TaskValue::from_value(value).map_err(AttemptError::Abort)?;
        let state = task.task_state().map_err(AttemptError::Abort)?;
        tracing::debug!(method = self.method, task_id = self.task_id, state = %state, "Polled agent task");

        if state.is_running() {
            return Err(AttemptError::Retry(AgentError::TaskRunning {
                method: self.method.to_string(),
            }));
        }
        self.last = Some(task);
        Ok(())
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn ping(&self) -> Result<String> {
        let value = self
            .send("ping", &[])
            .await
            .context("Sending ping to the agent")?;
        match value {
            Some(Value::String(reply)) if !reply.is_empty() => Ok(reply),
            // no value and no exception: surface the (empty) exception message
            None | Some(Value::String(_)) => Err(AgentError::AgentException {
                message: String::new(),
            }
            .context("Sending ping to the agent")),
            Some(_) => Err(AgentError::protocol("value", "expected a string")),
        }
    }

    async fn start(&self) -> Result<()> {
        let value = self
            .send("start", &[])
            .await
            .context("Starting agent services")?;
        match value {
            Some(Value::String(reply)) if reply == "started" => Ok(()),
            Some(Value::String(reply)) => Err(AgentError::StartFailed { response: reply }),
            other => Err(AgentError::StartFailed {
                response: other.map(|v| v.to_string()).unwrap_or_default(),
            }),
        }
    }

    async fn stop(&self) -> Result<()> {
        let result = self.send_async_task("stop", &[]).await?;
        tracing::debug!(result = ?result, "Agent services stopped");
        Ok(())
    }

    async fn apply(&self, spec: &ApplySpec) -> Result<()> {
        let spec = serde_json::to_value(spec)
            .map_err(|e| AgentError::protocol("arguments", e.to_string()))?;
        self.send_async_task("apply", &[spec]).await?;
        Ok(())
    }

    async fn get_state(&self) -> Result<AgentState> {
        let value = self
            .send("get_state", &[])
            .await
            .context("Sending get_state to the agent")?
            .ok_or_else(|| AgentError::protocol("value", "missing"))?;
        serde_json::from_value(value).map_err(|e| AgentError::protocol("value", e.to_string()))
    }

    async fn list_disk(&self) -> Result<Vec<String>> {
        let value = self
            .send("list_disk", &[])
            .await
            .context("Sending list_disk to the agent")?
            .ok_or_else(|| AgentError::protocol("value", "missing"))?;
        serde_json::from_value(value).map_err(|e| AgentError::protocol("value", e.to_string()))
    }

    async fn mount_disk(&self, disk_cid: &str) -> Result<()> {
        self.send_async_task("mount_disk", &[json!(disk_cid)]).await?;
        Ok(())
    }

    async fn unmount_disk(&self, disk_cid: &str) -> Result<()> {
        self.send_async_task("unmount_disk", &[json!(disk_cid)]).await?;
        Ok(())
    }

    async fn migrate_disk(&self) -> Result<()> {
        self.send_async_task("migrate_disk", &[]).await?;
        Ok(())
    }

    async fn compile_package(&self, source: &BlobRef, dependencies: &[BlobRef]) -> Result<BlobRef> {
        let deps: Map<String, Value> = dependencies
            .iter()
            .map(|dep| {
                serde_json::to_value(dep)
                    .map(|v| (dep.name.clone(), v))
                    .map_err(|e| AgentError::protocol("arguments", e.to_string()))
            })
            .collect::<Result<_>>()?;
        let arguments = [
            json!(source.blobstore_id),
            json!(source.sha1),
            json!(source.name),
            json!(source.version),
            Value::Object(deps),
        ];

        let task = self
            .send_async_task("compile_package", &arguments)
            .await
            .context(format!("Compiling package '{}'", source.name))?;

        let result = task
            .as_map()
            .and_then(|map| map.get("result"))
            .and_then(Value::as_object)
            .ok_or_else(|| AgentError::protocol("value.result", "missing or not an object"))?;
        let field = |name: &str| {
            result
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AgentError::protocol(format!("value.result.{name}"), "missing or not a string"))
        };

        Ok(BlobRef {
            name: source.name.clone(),
            version: source.version.clone(),
            sha1: field("sha1")?,
            blobstore_id: field("blobstore_id")?,
        })
    }
}
