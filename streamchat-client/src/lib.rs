//! Streaming chat client over WebSocket
//!
//! This crate keeps one persistent WebSocket connection to a chat backend
//! and turns the backend's streamed frames into ordered events for a UI.
//!
//! # Core Features
//!
//! - **Background Connection**: handshake, read loop and retries run on a
//!   dedicated worker thread; every call on the handle is fire-and-forget
//! - **Streaming Dispatch**: one `ChunkReceived` per text chunk, in wire order
//! - **Auto-Reconnection**: exponential backoff with a failure ceiling
//! - **Provider Tuning**: ping and frame-size settings follow the provider
//!   the backend reports
//! - **Observability**: tracing everywhere, OpenTelemetry metrics on demand
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use streamchat_client::{ClientBuilder, ClientEvent, StaticConfig};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StaticConfig::from_env()?;
//!     let (client, mut events) = ClientBuilder::new(Arc::new(config)).build()?;
//!
//!     // Sends are rejected with `NotConnected` until the link is up
//!     client.connect();
//!
//!     while let Some(event) = events.blocking_recv() {
//!         match event {
//!             ClientEvent::ConnectivityChanged(true) => {
//!                 client.send_message("Explain ownership in one paragraph");
//!             }
//!             ClientEvent::ChunkReceived { text, .. } => print!("{}", text),
//!             ClientEvent::MessageCompleted { .. } => break,
//!             ClientEvent::ErrorOccurred(e) => eprintln!("error: {}", e),
//!             _ => {}
//!         }
//!     }
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # With a Custom Strategy
//!
//! ```rust,no_run
//! use streamchat_client::{ClientBuilder, ConnectionEndpoint, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # fn example() -> streamchat_core::Result<()> {
//! let (client, events) = ClientBuilder::from_endpoint(ConnectionEndpoint::new("chat.local", 443, true))
//!     .with_reconnect(Box::new(
//!         ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30)).with_jitter(),
//!     ))
//!     .max_reconnect_attempts(10)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod config;
mod connection_state;
mod dispatcher;
mod events;
mod metrics;
mod provider;
mod reconnect;

pub use client::ChatClient;
pub use client_builder::{ClientBuilder, DEFAULT_ENDPOINT_SWITCH_DELAY, DEFAULT_SHUTDOWN_TIMEOUT};
pub use config::{
    ConfigProvider, ConnectionEndpoint, ProviderKind, StaticConfig, TransportTuning,
    DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
pub use connection_state::{ConnectionManager, ConnectionState, FailureOutcome, SharedStatus};
pub use dispatcher::{FrameDispatcher, StreamingSession};
pub use events::{channel as event_channel, ClientEvent, EventReceiver, EventSender};
pub use metrics::ClientMetrics;
pub use provider::{ProviderInfo, ProviderProfile};
pub use reconnect::{ExponentialBackoff, FixedDelay, NoReconnect, ReconnectionStrategy, RetryDecision};
