//! HTTP client for agent endpoints

use std::fmt;
use std::time::Duration;

use agent_api::{ApiResponse, DeployRequest, RollbackRequest};
use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::errors::AgentError;

/// Default per-request timeout; bring-up may pull images
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// One agent addressed by a rollout
#[derive(Debug, Clone)]
pub struct AgentNode {
    base_url: String,
    token: SecretString,
}

impl AgentNode {
    /// Create a node from its base URL and the shared bearer secret
    pub fn new(url: &str, token: SecretString) -> Result<Self, AgentError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| AgentError::ValidationError(format!("Invalid agent URL {:?}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AgentError::ValidationError(format!(
                "Agent URL must use http or https: {}",
                url
            )));
        }

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Display for AgentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Transport used by the orchestrator to reach agents
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Send a deploy and wait for the agent's terminal answer
    async fn deploy(&self, node: &AgentNode, req: &DeployRequest) -> Result<ApiResponse, AgentError>;

    /// Send a rollback and wait for the agent's terminal answer
    async fn rollback(
        &self,
        node: &AgentNode,
        req: &RollbackRequest,
    ) -> Result<ApiResponse, AgentError>;
}

/// reqwest-backed agent client
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
}

impl AgentClient {
    /// Create a client with the default request timeout
    pub fn new() -> Result<Self, AgentError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with an explicit request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        node: &AgentNode,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, AgentError> {
        let url = node.endpoint(path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", node.token.expose_secret()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::NetworkError(format!("{}: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::NetworkError(format!("{}: {}", url, e)))?;
        let parsed: Option<ApiResponse> = serde_json::from_str(&text).ok();

        let (message, outcome) = match parsed {
            Some(body) if status.is_success() && body.is_success() => return Ok(body),
            Some(body) => (body.error.unwrap_or_else(|| text.clone()), body.state),
            None => (text.clone(), None),
        };

        error!("POST {} failed: {} - {}", url, status, text);
        Err(AgentError::RemoteError {
            status: status.as_u16(),
            message,
            outcome,
        })
    }
}

#[async_trait]
impl AgentTransport for AgentClient {
    async fn deploy(&self, node: &AgentNode, req: &DeployRequest) -> Result<ApiResponse, AgentError> {
        self.post(node, "/deploy", req).await
    }

    async fn rollback(
        &self,
        node: &AgentNode,
        req: &RollbackRequest,
    ) -> Result<ApiResponse, AgentError> {
        self.post(node, "/rollback", req).await
    }
}
