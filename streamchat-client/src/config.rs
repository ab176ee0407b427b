//! Connection configuration
//!
//! The client reads its settings through the narrow [`ConfigProvider`]
//! trait: where to connect, how to tune the transport for the detected
//! provider, and how many consecutive failures to tolerate. Applications
//! plug in their own settings store; [`StaticConfig`] covers fixed values
//! and environment variables.
//!
//! # Environment Variables
//!
//! [`StaticConfig::from_env`] reads:
//! - `STREAMCHAT_HOST` (default `localhost`)
//! - `STREAMCHAT_PORT` (default `8000`)
//! - `STREAMCHAT_TLS` (`true`/`1`/`yes` to use `wss://`)
//! - `STREAMCHAT_MAX_RECONNECT_ATTEMPTS` (default `5`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use streamchat_core::{Error, Result};

/// Default ceiling on consecutive connection failures
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

const DEFAULT_PATH: &str = "/ws/chat";

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

/// Where the backend lives
///
/// Immutable for the duration of a connection attempt; replacing it goes
/// through `ChatClient::update_endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    pub host: String,
    pub port: u16,
    /// Connect with `wss://` instead of `ws://`
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

impl ConnectionEndpoint {
    /// Endpoint with the default `/ws/chat` path
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            path: default_path(),
        }
    }

    /// Override the request path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Check the endpoint can be connected to
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidEndpoint("host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidEndpoint(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(Error::InvalidEndpoint(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        Ok(())
    }

    /// The WebSocket URL for this endpoint
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

impl Default for ConnectionEndpoint {
    fn default() -> Self {
        Self::new("localhost", 8000, false)
    }
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// AI provider generating responses, as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    Unknown,
}

impl ProviderKind {
    /// Map a backend-reported provider name (case-insensitive)
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" => ProviderKind::Anthropic,
            "openai" => ProviderKind::OpenAi,
            _ => ProviderKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport and error-policy settings applied at handshake time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportTuning {
    /// Interval between keepalive pings; zero disables keepalive
    pub ping_interval: Duration,
    /// How long to wait for any traffic after a ping before declaring the link dead
    pub ping_timeout: Duration,
    /// Largest accepted message and frame
    pub max_message_size: usize,
    /// Request permessage-deflate (advisory; see DESIGN.md)
    pub compression: bool,
    /// Downgrade errors the backend marks recoverable to warnings
    pub use_recoverable_errors: bool,
    /// Upper bound on a single handshake
    pub connect_timeout: Duration,
}

impl TransportTuning {
    /// Built-in settings for a provider
    pub fn for_provider(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::Anthropic => Self {
                ping_interval: Duration::from_secs(15),
                ping_timeout: Duration::from_secs(8),
                max_message_size: 2 * 1024 * 1024,
                compression: true,
                use_recoverable_errors: true,
                connect_timeout: Duration::from_secs(10),
            },
            ProviderKind::OpenAi => Self {
                ping_interval: Duration::from_secs(20),
                ping_timeout: Duration::from_secs(10),
                max_message_size: 1024 * 1024,
                compression: true,
                use_recoverable_errors: false,
                connect_timeout: Duration::from_secs(10),
            },
            ProviderKind::Unknown => Self {
                ping_interval: Duration::from_secs(30),
                ping_timeout: Duration::from_secs(15),
                max_message_size: 1024 * 1024,
                compression: true,
                use_recoverable_errors: false,
                connect_timeout: Duration::from_secs(10),
            },
        }
    }
}

impl Default for TransportTuning {
    fn default() -> Self {
        Self::for_provider(ProviderKind::Unknown)
    }
}

/// Read-only source of connection settings
///
/// Implementations must be cheap to call; the client queries them before
/// every handshake and whenever a backend error needs a policy decision.
pub trait ConfigProvider: Send + Sync {
    /// Endpoint for the next connection, `None` if unconfigured
    fn endpoint(&self) -> Option<ConnectionEndpoint>;

    /// Transport tuning for the given provider
    fn tuning_for(&self, provider: ProviderKind) -> TransportTuning {
        TransportTuning::for_provider(provider)
    }

    /// Consecutive failures tolerated before automatic reconnection stops
    fn max_reconnect_attempts(&self) -> u32 {
        DEFAULT_MAX_RECONNECT_ATTEMPTS
    }
}

/// Fixed configuration with optional per-provider overrides
#[derive(Debug, Clone)]
pub struct StaticConfig {
    endpoint: Option<ConnectionEndpoint>,
    max_reconnect_attempts: u32,
    overrides: HashMap<ProviderKind, TransportTuning>,
}

impl StaticConfig {
    /// Configuration pointing at `endpoint`
    pub fn new(endpoint: ConnectionEndpoint) -> Self {
        Self {
            endpoint: Some(endpoint),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            overrides: HashMap::new(),
        }
    }

    /// Configuration with no endpoint; connecting reports `NoEndpoint`
    pub fn unconfigured() -> Self {
        Self {
            endpoint: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            overrides: HashMap::new(),
        }
    }

    /// Load from `STREAMCHAT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup using the `STREAMCHAT_*` names
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("STREAMCHAT_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match lookup("STREAMCHAT_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                Error::InvalidEndpoint(format!("STREAMCHAT_PORT is not a valid port: {}", raw))
            })?,
            None => 8000,
        };
        let use_tls = lookup("STREAMCHAT_TLS")
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let max_reconnect_attempts = match lookup("STREAMCHAT_MAX_RECONNECT_ATTEMPTS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::InvalidEndpoint(format!(
                    "STREAMCHAT_MAX_RECONNECT_ATTEMPTS is not a number: {}",
                    raw
                ))
            })?,
            None => DEFAULT_MAX_RECONNECT_ATTEMPTS,
        };

        let endpoint = ConnectionEndpoint::new(host, port, use_tls);
        endpoint.validate()?;

        tracing::info!(
            url = %endpoint,
            max_reconnect_attempts,
            "Connection configuration loaded from environment"
        );

        Ok(Self::new(endpoint).with_max_reconnect_attempts(max_reconnect_attempts))
    }

    /// Set the failure ceiling
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Replace the built-in tuning for one provider
    pub fn with_tuning(mut self, provider: ProviderKind, tuning: TransportTuning) -> Self {
        self.overrides.insert(provider, tuning);
        self
    }
}

impl ConfigProvider for StaticConfig {
    fn endpoint(&self) -> Option<ConnectionEndpoint> {
        self.endpoint.clone()
    }

    fn tuning_for(&self, provider: ProviderKind) -> TransportTuning {
        self.overrides
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| TransportTuning::for_provider(provider))
    }

    fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }
}
