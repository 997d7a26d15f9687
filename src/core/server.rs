/// MCP Server Implementation
///
/// This module contains the core MCP server implementation including:
/// - JSON-RPC 2.0 request/response structures
/// - Tool registry mapping tool names to async handlers
/// - A single dispatcher shared by both transports
/// - STDIO server implementation for line-based communication
/// - HTTP server setup with Actix Web

use actix_web::{
    http::header::ContentType,
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer,
};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info, warn};

use crate::core::client::AgentQlClient;
use crate::core::config::{Config, HttpConfig};
use crate::core::error::{codes, ConfigError, ToolError};
use crate::tools;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// The jsonrpc field must be "2.0", id is optional (None for notifications),
/// method specifies the MCP method to call, and params contains
/// method-specific parameters.
#[derive(Deserialize, Debug)]
pub struct MCPRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    /// Request ID for correlating responses. None (key absent) indicates a
    /// notification; an explicit `null` is kept as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    id: Option<Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    method: String,
    params: Option<Value>,
}

fn present_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 2.0 response structure for MCP protocol.
///
/// Exactly one of `result` and `error` is present.
#[derive(Serialize, Debug)]
pub struct MCPResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<MCPError>,
}

impl MCPResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    fn from_serializable<T: Serialize>(id: Option<Value>, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::failure(id, codes::INTERNAL_ERROR, format!("Internal error: {}", e)),
        }
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Debug)]
pub struct MCPError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// MCP tool definition structure.
///
/// Each tool must have a unique name, description, and JSON schema defining
/// its input parameters. This structure is serialized when listing tools.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MCPTool {
    pub name: String,
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One block of tool output.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// Result of `tools/call`, as returned to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// Contract every tool implements.
///
/// `call` validates the arguments before doing any work, so a rejected call
/// has no side effects.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> MCPTool;

    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError>;
}

/// Registry of available MCP tools.
///
/// The registry maintains a list of tool definitions for discovery and a
/// HashMap of tool names to their handlers for execution.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<MCPTool>,
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let tool = handler.definition();
        self.tools.retain(|existing| existing.name != tool.name);
        self.handlers.insert(tool.name.clone(), handler);
        self.tools.push(tool);
    }

    /// All registered tool definitions, in registration order.
    pub fn list(&self) -> &[MCPTool] {
        &self.tools
    }

    /// Run the named tool.
    ///
    /// Unknown names fail with `ToolError::UnknownTool` without touching any
    /// handler.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, ToolError> {
        let handler = self.handlers.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        handler.call(arguments).await
    }
}

/// Initialize and register all tools.
///
/// This function is called during server startup to create the tool registry
/// and register all available tools.
pub fn initialize_tools(config: &Config) -> Result<ToolRegistry, ConfigError> {
    let mut registry = ToolRegistry::new();
    let client = AgentQlClient::new(config.upstream.clone())?;

    tools::extract::register(&mut registry, client);

    Ok(registry)
}

/// MCP protocol dispatcher.
///
/// Holds the server metadata reported by `initialize` and the tool registry.
/// Immutable after construction and shared by both transports.
pub struct McpServer {
    server_name: String,
    server_version: String,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
            registry,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registry = initialize_tools(config)?;
        Ok(Self::new(&config.server_name, &config.server_version, registry))
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }

    /// Decode one raw JSON-RPC message and dispatch it.
    ///
    /// Returns `None` only for notifications. Bytes that are not JSON get a
    /// `-32700` parse error and JSON that is not a request gets `-32600`,
    /// both answered with `id: null` unless an id can be recovered.
    pub async fn handle_message(&self, raw: &[u8]) -> Option<MCPResponse> {
        let message: Value = match serde_json::from_slice(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Parse error: {}", e);
                return Some(MCPResponse::failure(
                    None,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = message.get("id").cloned();
        match serde_json::from_value::<MCPRequest>(message) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("Invalid request: {}", e);
                Some(MCPResponse::failure(
                    id,
                    codes::INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                ))
            }
        }
    }

    /// Route a decoded request to the method handler.
    pub async fn handle_request(&self, request: MCPRequest) -> Option<MCPResponse> {
        // Notifications are one-way messages that don't require responses
        if request.id.is_none() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let MCPRequest { id, method, params, .. } = request;
        let response = match method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => MCPResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => MCPResponse::failure(id, codes::METHOD_NOT_FOUND, format!("Method not found: {}", method)),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> MCPResponse {
        MCPResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": self.server_name,
                    "version": self.server_version
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> MCPResponse {
        #[derive(Serialize)]
        struct ToolsList<'a> {
            tools: &'a [MCPTool],
        }

        MCPResponse::from_serializable(id, &ToolsList { tools: self.registry.list() })
    }

    /// Handle MCP tools/call method.
    ///
    /// Protocol errors (unknown tool, bad arguments) become JSON-RPC errors.
    /// Execution failures become a tool result with `isError: true`.
    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> MCPResponse {
        let Some(params) = params else {
            return MCPResponse::failure(id, codes::INVALID_PARAMS, "Invalid params");
        };

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return MCPResponse::failure(id, codes::INVALID_PARAMS, "Invalid params: missing tool name");
        };

        // Extract tool arguments, defaulting to empty object if not provided
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        info!(tool = tool_name, "Calling tool");
        match self.registry.call(tool_name, arguments).await {
            Ok(result) => MCPResponse::from_serializable(id, &result),
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Tool call failed");
                match e.protocol_code() {
                    Some(code) => MCPResponse::failure(id, code, e.to_string()),
                    None => MCPResponse::from_serializable(id, &CallToolResult::error(format!("Error: {}", e))),
                }
            }
        }
    }
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes responses to
/// stdout. All logging goes to stderr to avoid interfering with the JSON-RPC
/// protocol stream. Returns when stdin reaches EOF.
pub async fn run_server_stdio(server: Arc<McpServer>) -> std::io::Result<()> {
    info!(name = %server.server_name, version = %server.server_version, "MCP Server Starting (STDIO mode)");

    // 8KB buffer size balances memory usage with I/O efficiency
    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());

    serve_lines(&server, stdin, stdout).await?;

    info!("STDIN closed, shutting down");
    Ok(())
}

/// Line-based request loop behind the STDIO transport.
///
/// Processes requests one at a time and flushes after each response. Lines
/// are read as raw bytes, so a malformed line (including invalid UTF-8) is
/// answered with a parse error instead of ending the loop.
pub async fn serve_lines<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(8192);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let Some(response) = server.handle_message(line).await else {
            continue;
        };

        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!("Error serializing response: {}", e);
                continue;
            }
        };

        // Each response must be on a single line followed by newline
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Health check endpoint handler.
async fn health(server: web::Data<McpServer>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": server.name()
    }))
}

/// MCP JSON-RPC request handler for HTTP mode.
///
/// The raw body goes through the same dispatcher as STDIO, so parse errors
/// and notifications behave identically on both transports.
async fn mcp_handler(server: web::Data<McpServer>, body: web::Bytes) -> HttpResponse {
    match server.handle_message(&body).await {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    }
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type(ContentType::json())
        .body(r#"{"error":"not found"}"#)
}

/// Route table for the HTTP transport.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health))
        .default_service(web::to(not_found));
}

/// Run the MCP server in HTTP mode.
///
/// Serves JSON-RPC 2.0 over HTTP POST on `/mcp` and `/`, plus a `/health`
/// check endpoint.
///
/// # Configuration
/// - Worker threads: from `HttpConfig::workers`
/// - Max connections: 10,000 concurrent connections
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(server: Arc<McpServer>, http: &HttpConfig) -> std::io::Result<()> {
    use std::time::Duration;

    let bind_addr = http.bind_addr();
    let data = web::Data::from(server);

    info!(
        name = %data.server_name,
        version = %data.server_version,
        bind = %bind_addr,
        workers = http.workers,
        "MCP Server Starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            // Format: %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(http.workers)
    .max_connections(10000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}
