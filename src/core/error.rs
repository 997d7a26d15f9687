/// Error Types
///
/// Startup failures (`ConfigError`) end the process with exit code 1.
/// Invocation failures (`ToolError`) are reported back to the MCP client
/// and never take the server down.

use thiserror::Error;

/// JSON-RPC 2.0 error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Configuration could not be assembled at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The upstream credential is absent or empty.
    #[error("{var} environment variable is required")]
    MissingCredential { var: &'static str },

    /// A variable is set but cannot be used.
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// The outbound HTTP client failed to initialize.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A single tool invocation failed.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: '{name}'")]
    UnknownTool { name: String },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// Non-success HTTP status. Status text and body are kept verbatim.
    #[error("AgentQL API error: {status}\n{body}")]
    Upstream { status: String, body: String },

    #[error("AgentQL API returned a malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("AgentQL API request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("AgentQL API request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

impl ToolError {
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// JSON-RPC error code when the failure is a protocol error rather than
    /// a tool execution error.
    ///
    /// Protocol errors are returned in the JSON-RPC `error` member. Everything
    /// else becomes a tool result with `isError: true`.
    pub fn protocol_code(&self) -> Option<i32> {
        match self {
            Self::UnknownTool { .. } | Self::InvalidArguments { .. } => Some(codes::INVALID_PARAMS),
            _ => None,
        }
    }
}
