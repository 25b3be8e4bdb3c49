//! Wire types for the agent's HTTP/JSON protocol.
//!
//! Every call is a `POST {endpoint}/agent` carrying
//! `{"method", "arguments", "reply_to"}` and answered with
//! `{"value", "exception"}`. The shape of `value` depends on the method and,
//! for async tasks, on the phase of the task; [`TaskValue`] models that.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Request envelope sent to the agent.
#[derive(Debug, Serialize)]
pub struct AgentRequest<'a> {
    /// RPC method name.
    pub method: &'a str,
    /// Positional arguments.
    pub arguments: &'a [Value],
    /// Director identifier of the caller.
    pub reply_to: &'a str,
}

/// Response envelope returned by the agent.
#[derive(Debug, Default, Deserialize)]
pub struct AgentResponse {
    /// Method result, absent on failure.
    #[serde(default)]
    pub value: Option<Value>,
    /// Set when the agent reports a failure.
    #[serde(default)]
    pub exception: Option<AgentException>,
}

/// The `exception` object of a failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentException {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl AgentResponse {
    /// Parse a raw response body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| AgentError::protocol("body", e.to_string()))
    }

    /// Turn an `exception` into an error, otherwise return the value.
    pub fn into_value(self) -> Result<Option<Value>> {
        if let Some(exception) = self.exception {
            return Err(AgentError::AgentException {
                message: exception.message,
            });
        }
        Ok(self.value)
    }
}

/// Value of an async task response.
///
/// The agent reports a task as a map while it is in flight
/// (`{"agent_task_id": .., "state": "running"}`), as a map without `state`
/// once a method with a structured result completes, and as a bare string
/// once a method with a scalar result completes (`"stopped"`).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    /// Scalar result of a finished task.
    Text(String),
    /// In-flight task descriptor or structured result.
    Map(Map<String, Value>),
}

impl TaskValue {
    /// Decode from the raw `value` field, looking at the JSON kind first.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Text(s)),
            Value::Object(map) => Ok(Self::Map(map)),
            other => Err(AgentError::protocol(
                "value",
                format!("expected a string or an object, got {}", json_kind(&other)),
            )),
        }
    }

    /// State of the task this value describes.
    ///
    /// A map's `state` key wins; a map without one and a bare string both
    /// mean the task has finished.
    pub fn task_state(&self) -> Result<TaskState> {
        match self {
            Self::Map(map) => match map.get("state") {
                Some(Value::String(state)) => Ok(TaskState::from(state.as_str())),
                Some(other) => Err(AgentError::protocol(
                    "value.state",
                    format!("expected a string, got {}", json_kind(other)),
                )),
                None => Ok(TaskState::Finished),
            },
            Self::Text(_) => Ok(TaskState::Finished),
        }
    }

    /// The `agent_task_id` of an in-flight task.
    pub fn task_id(&self) -> Result<&str> {
        match self {
            Self::Map(map) => match map.get("agent_task_id") {
                Some(Value::String(id)) => Ok(id.as_str()),
                Some(other) => Err(AgentError::protocol(
                    "value.agent_task_id",
                    format!("expected a string, got {}", json_kind(other)),
                )),
                None => Err(AgentError::protocol("value.agent_task_id", "missing")),
            },
            Self::Text(text) => Err(AgentError::protocol(
                "value.agent_task_id",
                format!("expected a task object, got string '{text}'"),
            )),
        }
    }

    /// The map payload, if this is a map.
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Text(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for TaskValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// State of an async agent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Still executing; keep polling.
    Running,
    /// Completed.
    Finished,
    /// Any other terminal state reported by the agent (e.g. `failed`).
    Other(String),
}

impl TaskState {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Other(state) => state,
        }
    }

    /// True while the agent still reports the task as running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<&str> for TaskState {
    fn from(state: &str) -> Self {
        match state {
            "running" => Self::Running,
            "finished" => Self::Finished,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Aggregate job state, e.g. `running` or `pending`.
    pub job_state: String,
}

/// Reference to a content-addressed blob in the blobstore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef {
    /// Package or template name.
    pub name: String,
    /// Version; the fingerprint for packages.
    pub version: String,
    /// SHA1 of the blob contents.
    pub sha1: String,
    /// Blobstore identifier.
    pub blobstore_id: String,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
