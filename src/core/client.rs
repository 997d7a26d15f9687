/// AgentQL Upstream Client
///
/// Thin wrapper around a `reqwest::Client` that knows the AgentQL endpoint,
/// credential and headers. It sends exactly one request per call and never
/// retries.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::config::UpstreamConfig;
use crate::core::error::{ConfigError, ToolError};

/// Value of the origin header identifying this server to AgentQL.
const REQUEST_ORIGIN: &str = "mcp-server";

#[derive(Debug, Clone)]
pub struct AgentQlClient {
    client: Client,
    config: UpstreamConfig,
}

impl AgentQlClient {
    /// Create a client for the given upstream settings.
    ///
    /// The configured timeout bounds the whole request, including reading
    /// the response body.
    pub fn new(config: UpstreamConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// POST `body` to the endpoint and return the `data` member of the reply.
    ///
    /// # Errors
    /// * `ToolError::Upstream` - non-success status, with status text and body
    /// * `ToolError::MalformedResponse` - body is not a JSON object with `data`
    /// * `ToolError::Timeout` - no complete response within the timeout
    /// * `ToolError::Transport` - any other network failure
    #[instrument(skip(self, body), fields(endpoint = %self.config.endpoint))]
    pub async fn query_data<B: Serialize + ?Sized>(&self, body: &B) -> Result<Value, ToolError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-API-Key", &self.config.api_key)
            .header("X-TF-Request-Origin", REQUEST_ORIGIN)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "AgentQL responded");

        if !status.is_success() {
            // Keep the status even when the body cannot be read.
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<failed to read response body: {}>", e),
            };
            return Err(ToolError::Upstream {
                status: status.to_string(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        extract_data(&text)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ToolError {
        if err.is_timeout() {
            ToolError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            ToolError::Transport(err)
        }
    }
}

/// Pull the `data` member out of a successful response body.
fn extract_data(body: &str) -> Result<Value, ToolError> {
    let mut json: Value = serde_json::from_str(body).map_err(|e| ToolError::MalformedResponse {
        reason: format!("body is not valid JSON: {}", e),
    })?;

    let object = json
        .as_object_mut()
        .ok_or_else(|| ToolError::MalformedResponse {
            reason: "body is not a JSON object".to_string(),
        })?;

    object
        .remove("data")
        .ok_or_else(|| ToolError::MalformedResponse {
            reason: "body has no 'data' field".to_string(),
        })
}
