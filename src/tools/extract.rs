/// Web Data Extraction Tool
///
/// Exposes the AgentQL `query-data` endpoint as the `extract-web-data` tool.
/// The tool takes a page URL and a natural language prompt, forwards them
/// upstream with a fixed set of query options and returns the extracted
/// `data` as pretty-printed JSON text.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::core::client::AgentQlClient;
use crate::core::error::ToolError;
use crate::core::server::{CallToolResult, MCPTool, ToolHandler, ToolRegistry};

pub const EXTRACT_TOOL_NAME: &str = "extract-web-data";

/// Request body sent to the AgentQL `query-data` endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UpstreamQuery {
    pub url: String,
    pub prompt: String,
    pub params: QueryParams,
}

/// Query options. Always the fixed defaults below.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub wait_for: u32,
    pub is_scroll_to_bottom_enabled: bool,
    pub mode: QueryMode,
    pub is_screenshot_enabled: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            wait_for: 0,
            is_scroll_to_bottom_enabled: false,
            mode: QueryMode::Fast,
            is_screenshot_enabled: false,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Fast,
}

pub struct ExtractWebData {
    client: AgentQlClient,
}

impl ExtractWebData {
    pub fn new(client: AgentQlClient) -> Self {
        Self { client }
    }

    /// Check the call arguments and build the upstream query from them.
    ///
    /// Both `url` and `prompt` must coerce to non-empty strings. Nothing is
    /// sent upstream when this fails.
    pub fn validate(arguments: &Value) -> Result<UpstreamQuery, ToolError> {
        let args = arguments
            .as_object()
            .ok_or_else(|| ToolError::invalid_arguments("arguments must be an object"))?;

        let url = args.get("url").and_then(coerce_to_string);
        let prompt = args.get("prompt").and_then(coerce_to_string);

        match (url, prompt) {
            (Some(url), Some(prompt)) => Ok(UpstreamQuery {
                url,
                prompt,
                params: QueryParams::default(),
            }),
            _ => Err(ToolError::invalid_arguments("Both 'url' and 'prompt' are required")),
        }
    }

    async fn execute(&self, query: UpstreamQuery) -> Result<CallToolResult, ToolError> {
        let data = self.client.query_data(&query).await?;

        let text = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
        Ok(CallToolResult::text(text))
    }
}

#[async_trait]
impl ToolHandler for ExtractWebData {
    fn definition(&self) -> MCPTool {
        MCPTool {
            name: EXTRACT_TOOL_NAME.to_string(),
            description: "Extracts structured data as JSON from a web page given a URL using a Natural Language description of the data.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL of the public webpage to extract data from"
                    },
                    "prompt": {
                        "type": "string",
                        "description": "Natural Language description of the data to extract from the page"
                    }
                },
                "required": ["url", "prompt"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let query = Self::validate(&arguments)?;
        info!(url = %query.url, endpoint = %self.client.endpoint(), "Extracting web data");
        self.execute(query).await
    }
}

/// Scalars become their JSON text. Null, arrays, objects and blank strings
/// are rejected.
fn coerce_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Register the extraction tool with the tool registry.
pub fn register(registry: &mut ToolRegistry, client: AgentQlClient) {
    registry.register(Box::new(ExtractWebData::new(client)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::UpstreamConfig;
    use crate::core::server::Content;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> ExtractWebData {
        let client = AgentQlClient::new(UpstreamConfig {
            api_key: "test-key".to_string(),
            endpoint: format!("{}/v1/query-data", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        ExtractWebData::new(client)
    }

    fn only_text(result: &CallToolResult) -> &str {
        assert_eq!(result.content.len(), 1);
        match &result.content[0] {
            Content::Text { text } => text.as_str(),
        }
    }

    #[test]
    fn test_upstream_query_shape() {
        let query = ExtractWebData::validate(&json!({
            "url": "https://example.com",
            "prompt": "the page title"
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "url": "https://example.com",
                "prompt": "the page title",
                "params": {
                    "wait_for": 0,
                    "is_scroll_to_bottom_enabled": false,
                    "mode": "fast",
                    "is_screenshot_enabled": false
                }
            })
        );
    }

    #[test]
    fn test_validate_rejects_missing_or_empty() {
        let cases = [
            json!({}),
            json!({"url": "https://example.com"}),
            json!({"prompt": "title"}),
            json!({"url": "", "prompt": "title"}),
            json!({"url": "https://example.com", "prompt": "   "}),
            json!({"url": null, "prompt": "title"}),
            json!({"url": ["https://example.com"], "prompt": "title"}),
            json!("https://example.com"),
        ];
        for args in cases {
            let err = ExtractWebData::validate(&args).unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArguments { .. }),
                "expected InvalidArguments for {}, got {:?}",
                args,
                err
            );
        }
    }

    #[test]
    fn test_validate_coerces_scalars() {
        let query = ExtractWebData::validate(&json!({"url": "https://example.com", "prompt": 42})).unwrap();
        assert_eq!(query.prompt, "42");
    }

    #[tokio::test]
    async fn test_definition() {
        let mock_server = MockServer::start().await;
        let definition = tool_for(&mock_server).definition();

        assert_eq!(definition.name, "extract-web-data");
        assert_eq!(definition.input_schema["required"], json!(["url", "prompt"]));
        assert_eq!(definition.input_schema["properties"]["url"]["type"], "string");
        assert_eq!(definition.input_schema["properties"]["prompt"]["type"], "string");
    }

    #[tokio::test]
    async fn test_call_success_returns_pretty_data() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("X-API-Key", "test-key"))
            .and(body_json(json!({
                "url": "https://example.com",
                "prompt": "the page title",
                "params": {
                    "wait_for": 0,
                    "is_scroll_to_bottom_enabled": false,
                    "mode": "fast",
                    "is_screenshot_enabled": false
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"title": "Example"}})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = tool_for(&mock_server)
            .call(json!({"url": "https://example.com", "prompt": "the page title"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        let text = only_text(&result);
        assert_eq!(text, "{\n  \"title\": \"Example\"\n}");
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"title": "Example"}));
    }

    #[tokio::test]
    async fn test_call_upstream_500() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
            .mount(&mock_server)
            .await;

        let err = tool_for(&mock_server)
            .call(json!({"url": "https://example.com", "prompt": "title"}))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, ToolError::Upstream { .. }));
        assert!(message.contains("Internal Server Error"), "message: {}", message);
        assert!(message.contains("server error"), "message: {}", message);
    }

    #[tokio::test]
    async fn test_call_non_json_body_fails() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let err = tool_for(&mock_server)
            .call(json!({"url": "https://example.com", "prompt": "title"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::MalformedResponse { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_upstream() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&mock_server)
            .await;

        let tool = tool_for(&mock_server);
        for args in [json!({"url": "https://example.com"}), json!({"url": "", "prompt": ""})] {
            let err = tool.call(args).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments { .. }));
        }

        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests.is_empty());
    }
}
