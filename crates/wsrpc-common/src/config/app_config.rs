//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use std::env;
use std::str::FromStr;
use std::time::Duration;
use wsrpc_core::ConnectionConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub rpc: RpcSettings,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// WebSocket listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route the WebSocket upgrade is served on
    pub path: String,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Protocol settings applied to every connection
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub response_timeout_ms: u64,
    pub outbound_buffer: usize,
    pub observer_buffer: usize,
}

impl RpcSettings {
    /// Default deadline for outgoing requests
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Build the per-connection settings
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            response_timeout: self.response_timeout(),
            outbound_buffer: self.outbound_buffer,
            observer_buffer: self.observer_buffer,
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
            observer_buffer: default_observer_buffer(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "wsrpc".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    100
}

fn default_observer_buffer() -> usize {
    64
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("GATEWAY_PATH").unwrap_or_else(default_path);
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: lookup("GATEWAY_HOST").unwrap_or_else(default_host),
                port: parse_var(&lookup, "GATEWAY_PORT")?
                    .ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
                path,
            },
            rpc: RpcSettings {
                response_timeout_ms: parse_var(&lookup, "RPC_RESPONSE_TIMEOUT_MS")?
                    .unwrap_or_else(default_response_timeout_ms),
                outbound_buffer: parse_var(&lookup, "RPC_OUTBOUND_BUFFER")?
                    .unwrap_or_else(default_outbound_buffer),
                observer_buffer: parse_var(&lookup, "RPC_OBSERVER_BUFFER")?
                    .unwrap_or_else(default_observer_buffer),
            },
        })
    }
}

/// Parse an optional variable, rejecting values that are present but malformed
fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
