/// AgentQL MCP Server Entry Point
///
/// Loads configuration from the environment (and `.env`, when present),
/// registers the `extract-web-data` tool and serves MCP over the configured
/// transport. See `core::config` for the full list of environment variables.
///
/// Exit codes:
/// - 0: normal shutdown (STDIN closed or HTTP server stopped)
/// - 1: missing AGENTQL_API_KEY, invalid configuration or transport failure

mod core;
mod tools;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, TransportMode};
use crate::core::server::{self, McpServer};

/// Log to stderr only. Stdout carries the JSON-RPC stream in STDIO mode.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env (if present); real environment variables take precedence
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mcp_server = match McpServer::from_config(&config) {
        Ok(mcp_server) => Arc::new(mcp_server),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        endpoint = %config.upstream.endpoint,
        timeout_secs = config.upstream.timeout.as_secs(),
        "Configuration loaded"
    );

    let result = match config.transport {
        TransportMode::Stdio => server::run_server_stdio(mcp_server).await,
        TransportMode::Http => server::run_server_http(mcp_server, &config.http).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
