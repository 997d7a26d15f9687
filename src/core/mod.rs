/// Core Server Framework Module
///
/// This module contains the core server implementation including:
/// - server.rs: MCP server implementation with STDIO and HTTP transport
/// - client.rs: AgentQL upstream HTTP client
/// - config.rs: Environment-driven configuration
/// - error.rs: Startup and tool invocation error types

pub mod client;
pub mod config;
pub mod error;
pub mod server;
