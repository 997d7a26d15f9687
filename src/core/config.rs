/// Server Configuration
///
/// All configuration comes from environment variables and is read exactly
/// once at startup into an immutable `Config`, which is then passed to the
/// components that need it. Nothing else in the crate reads the environment.
///
/// Environment Variables:
/// - AGENTQL_API_KEY: Upstream API key (required)
/// - AGENTQL_API_URL: Upstream endpoint (default: https://api.agentql.com/v1/query-data)
/// - AGENTQL_TIMEOUT_SECS: Upstream request timeout in seconds (default: 60)
/// - SERVER_NAME: Name of the server (default: "agentql-mcp")
/// - SERVER_VERSION: Version string (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio" or "http" (default: "stdio")
/// - HOST: Bind address for HTTP mode (default: "0.0.0.0")
/// - PORT: Port number for HTTP mode (default: 3000)
/// - WORKER_THREADS: HTTP worker count (default: CPU count, max 16)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::ConfigError;

pub const API_KEY_VAR: &str = "AGENTQL_API_KEY";
pub const DEFAULT_ENDPOINT: &str = "https://api.agentql.com/v1/query-data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Transport the MCP server speaks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// JSON-RPC over HTTP POST served by Actix Web
    Http,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(format!("must be 'stdio' or 'http', got '{}'", other)),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Settings for the AgentQL upstream.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

// Hand-written so the key never ends up in logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
    pub transport: TransportMode,
    pub upstream: UpstreamConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    /// * `ConfigError::MissingCredential` - AGENTQL_API_KEY is unset or blank
    /// * `ConfigError::InvalidValue` - a variable is set but cannot be parsed
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential { var: API_KEY_VAR })?;

        let endpoint = lookup("AGENTQL_API_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                var: "AGENTQL_API_URL",
                value: endpoint,
                reason: "must be an http:// or https:// URL".to_string(),
            });
        }

        let timeout_secs: u64 = parse_var(&lookup, "AGENTQL_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "AGENTQL_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let transport = parse_var(&lookup, "MCP_TRANSPORT_MODE")?.unwrap_or(TransportMode::Stdio);

        // Defaults to CPU count but capped at 16 to avoid excessive context switching
        let workers = match parse_var::<_, usize>(&lookup, "WORKER_THREADS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    var: "WORKER_THREADS",
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(workers) => workers,
            None => num_cpus::get().clamp(1, 16),
        };

        Ok(Self {
            server_name: lookup("SERVER_NAME").unwrap_or_else(|| "agentql-mcp".to_string()),
            server_version: lookup("SERVER_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            transport,
            upstream: UpstreamConfig {
                api_key,
                endpoint,
                timeout: Duration::from_secs(timeout_secs),
            },
            http: HttpConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "PORT")?.unwrap_or(3000),
                workers,
            },
        })
    }
}

/// Parse an optional variable, rejecting values that are set but malformed.
fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("AGENTQL_API_KEY", "secret")]).unwrap();
        assert_eq!(config.server_name, "agentql-mcp");
        assert_eq!(config.server_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.upstream.api_key, "secret");
        assert_eq!(config.upstream.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.upstream.timeout, Duration::from_secs(60));
        assert_eq!(config.http.bind_addr(), "0.0.0.0:3000");
        assert!(config.http.workers >= 1 && config.http.workers <= 16);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("AGENTQL_API_KEY", "secret"),
            ("AGENTQL_API_URL", "http://127.0.0.1:9999/v1/query-data"),
            ("AGENTQL_TIMEOUT_SECS", "5"),
            ("SERVER_NAME", "custom"),
            ("SERVER_VERSION", "9.9.9"),
            ("MCP_TRANSPORT_MODE", "http"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("WORKER_THREADS", "2"),
        ])
        .unwrap();
        assert_eq!(config.server_name, "custom");
        assert_eq!(config.server_version, "9.9.9");
        assert_eq!(config.transport, TransportMode::Http);
        assert_eq!(config.upstream.endpoint, "http://127.0.0.1:9999/v1/query-data");
        assert_eq!(config.upstream.timeout, Duration::from_secs(5));
        assert_eq!(config.http.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.http.workers, 2);
    }

    #[test]
    fn test_missing_api_key() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { var: "AGENTQL_API_KEY" }));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let err = config_from(&[("AGENTQL_API_KEY", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ("MCP_TRANSPORT_MODE", "both"),
            ("PORT", "not-a-port"),
            ("AGENTQL_TIMEOUT_SECS", "0"),
            ("AGENTQL_TIMEOUT_SECS", "soon"),
            ("AGENTQL_API_URL", "ftp://example.com"),
            ("WORKER_THREADS", "-1"),
            ("WORKER_THREADS", "0"),
        ];
        for (var, value) in cases {
            let err = config_from(&[("AGENTQL_API_KEY", "secret"), (var, value)]).unwrap_err();
            match err {
                ConfigError::InvalidValue { var: got, .. } => assert_eq!(got, var),
                other => panic!("expected InvalidValue for {}={}, got {:?}", var, value, other),
            }
        }
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_from(&[("AGENTQL_API_KEY", "super-secret")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
