//! streamchat - streaming chat backend client
//!
//! This is the main convenience crate that re-exports the streamchat
//! sub-crates. Use it if you want a single dependency.
//!
//! # Architecture
//!
//! - **streamchat-core**: wire types, strict codec, errors, observability
//! - **streamchat-client**: connection worker, reconnection, frame
//!   dispatcher, event queue, configuration provider
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use streamchat::{ClientBuilder, ClientEvent, ConnectionEndpoint};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, mut events) =
//!         ClientBuilder::from_endpoint(ConnectionEndpoint::new("localhost", 8000, false)).build()?;
//!     client.connect();
//!
//!     // On each UI tick; send once the link is up
//!     'ui: loop {
//!         for event in events.drain() {
//!             match event {
//!                 ClientEvent::ConnectivityChanged(true) => {
//!                     client.send_message("Hello");
//!                 }
//!                 ClientEvent::ChunkReceived { text, .. } => print!("{}", text),
//!                 ClientEvent::MessageCompleted { .. } => break 'ui,
//!                 _ => {}
//!             }
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(16));
//!     }
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

pub use streamchat_client as client;
pub use streamchat_core as core;

pub use streamchat_client::{
    ChatClient, ClientBuilder, ClientEvent, ConfigProvider, ConnectionEndpoint, ConnectionState,
    EventReceiver, ProviderInfo, StaticConfig,
};
pub use streamchat_core::{Error, RequestId, Result};
