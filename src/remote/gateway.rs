//! JSON-over-HTTP transport to the agent service.
//!
//! The gateway knows three endpoints and nothing about what they mean. It
//! turns non-success responses into [`OrchestratorError::Remote`] and never
//! retries; callers decide whether a failure is worth another attempt.

use crate::config::ServiceConfig;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

/// The agent endpoints the orchestrator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Accepts new evaluation jobs.
    Submission,
    /// Answers `list_evaluations` / `get_evaluation_details` / `get_evaluation_cases`.
    Query,
    /// Lists and previews datasets.
    Catalog,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Submission => "submission",
            Endpoint::Query => "query",
            Endpoint::Catalog => "catalog",
        };
        f.write_str(name)
    }
}

/// Posts a JSON body to an endpoint and returns the parsed JSON response.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Value>;

    /// Point the gateway at new endpoints. Gateways without settings ignore this.
    fn reconfigure(&self, _config: ServiceConfig) {}
}

/// Error body shape used by the agents.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// reqwest-backed [`Gateway`].
pub struct HttpGateway {
    client: Client,
    config: RwLock<ServiceConfig>,
}

impl HttpGateway {
    /// Create a new gateway for the given service settings.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            client: Client::new(),
            config: RwLock::new(config),
        }
    }

    /// Replace endpoints and credential; subsequent requests use the new values.
    pub fn reconfigure(&self, config: ServiceConfig) {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
    }

    /// Snapshot of the current service settings.
    pub fn config(&self) -> ServiceConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn resolve(&self, endpoint: Endpoint) -> (String, Option<String>) {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let url = match endpoint {
            Endpoint::Submission => config.submission_url(),
            Endpoint::Query => config.query_url(),
            Endpoint::Catalog => config.catalog_url(),
        };
        (url, config.bearer_token().map(str::to_string))
    }

    /// Post to an explicit URL.
    pub async fn post_url(&self, url: &str, token: Option<&str>, body: &Value) -> Result<Value> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);

        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(url, status = status.as_u16(), "agent response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown error")
                    )
                });
            return Err(OrchestratorError::Remote {
                status_code: Some(status.as_u16()),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        serde_json::from_str(&text).map_err(|e| OrchestratorError::Remote {
            status_code: Some(status.as_u16()),
            message: format!("Malformed response body: {}", e),
        })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Value> {
        let (url, token) = self.resolve(endpoint);
        debug!(%endpoint, url = %url, "posting to agent");
        self.post_url(&url, token.as_deref(), &body).await
    }

    fn reconfigure(&self, config: ServiceConfig) {
        HttpGateway::reconfigure(self, config);
    }
}
