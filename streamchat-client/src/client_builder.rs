//! Client builder
//!
//! The `ClientBuilder` provides a fluent API for configuring the client
//! before its worker starts. It allows you to:
//! - Choose the configuration provider (endpoint, tuning, retry ceiling)
//! - Replace the reconnection strategy
//! - Enable OpenTelemetry observability and metrics
//! - Adjust the endpoint-switch delay and the shutdown timeout
//!
//! # Examples
//!
//! ```rust,no_run
//! use streamchat_client::{ClientBuilder, ClientEvent, ConnectionEndpoint};
//!
//! # fn example() -> streamchat_core::Result<()> {
//! let (client, mut events) =
//!     ClientBuilder::from_endpoint(ConnectionEndpoint::new("localhost", 8000, false))
//!         .max_reconnect_attempts(5)
//!         .build()?;
//!
//! client.connect();
//!
//! while let Some(event) = events.blocking_recv() {
//!     match event {
//!         ClientEvent::ConnectivityChanged(true) => {
//!             client.send_message("Hello");
//!         }
//!         ClientEvent::MessageCompleted { content, .. } => {
//!             println!("{}", content);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

use crate::client::{ChatClient, WorkerSettings};
use crate::config::{ConfigProvider, ConnectionEndpoint, StaticConfig};
use crate::events::{self, EventReceiver};
use crate::metrics::ClientMetrics;
use crate::reconnect::{ExponentialBackoff, ReconnectionStrategy};
use std::sync::Arc;
use std::time::Duration;
use streamchat_core::{Error, ObservabilityConfig, Result};

/// Delay between closing the old link and connecting to a new endpoint
pub const DEFAULT_ENDPOINT_SWITCH_DELAY: Duration = Duration::from_secs(1);

/// How long `shutdown()` waits for the worker thread
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for configuring and creating a [`ChatClient`]
pub struct ClientBuilder {
    config: Arc<dyn ConfigProvider>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    max_reconnect_attempts: Option<u32>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    endpoint_switch_delay: Duration,
    shutdown_timeout: Duration,
}

impl ClientBuilder {
    /// Builder reading settings from `config`
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            config,
            reconnect_strategy: None,
            max_reconnect_attempts: None,
            observability_config: None,
            service_name: None,
            endpoint_switch_delay: DEFAULT_ENDPOINT_SWITCH_DELAY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Builder with a fixed endpoint and default tuning
    pub fn from_endpoint(endpoint: ConnectionEndpoint) -> Self {
        Self::new(Arc::new(StaticConfig::new(endpoint)))
    }

    /// Replace the default exponential backoff (1s doubling to 60s)
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Override the failure ceiling from the configuration provider
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn endpoint_switch_delay(mut self, delay: Duration) -> Self {
        self.endpoint_switch_delay = delay;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the connection worker
    ///
    /// The client starts disconnected; call [`ChatClient::connect`].
    pub fn build(self) -> Result<(ChatClient, EventReceiver)> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            streamchat_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        let max_reconnect_attempts = self
            .max_reconnect_attempts
            .unwrap_or_else(|| self.config.max_reconnect_attempts());
        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::default()));

        let settings = WorkerSettings {
            config: self.config,
            strategy,
            max_reconnect_attempts,
            endpoint_switch_delay: self.endpoint_switch_delay,
            shutdown_timeout: self.shutdown_timeout,
            metrics,
        };

        let (sender, receiver) = events::channel();
        let client = ChatClient::spawn(settings, sender)?;
        Ok((client, receiver))
    }
}
