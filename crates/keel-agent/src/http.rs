//! HTTP transport seam.
//!
//! [`HttpAgentClient`](crate::HttpAgentClient) only needs "POST these bytes,
//! give me status and body". Keeping that behind [`HttpClient`] lets tests
//! script the agent without a socket.

use crate::config::AgentClientConfig;
use crate::error::{AgentError, Result};
use async_trait::async_trait;

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// Minimal JSON-over-HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST a JSON body to `url`.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client honoring the request timeout and TLS settings.
    pub fn new(config: &AgentClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| AgentError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        let response = self
            .inner
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| AgentError::Transport(format!("reading response body: {e}")))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
