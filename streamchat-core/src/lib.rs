//! Core types and codec for streamchat
//!
//! This crate holds everything about the streaming chat protocol that does
//! not depend on a live connection:
//!
//! - **Types**: outbound requests, inbound frames as a tagged union on
//!   `status`, chunk kinds, request identifiers
//! - **Codec**: encoding of requests and strict decoding of frames
//! - **Error handling**: one error enum classified by recovery policy
//! - **Observability**: tracing subscriber and OpenTelemetry setup
//!
//! The `streamchat-client` crate builds the persistent connection, the frame
//! dispatcher and the event surface on top of it.
//!
//! # Example
//!
//! ```rust
//! use streamchat_core::{codec, FrameBody, OutboundRequest};
//!
//! let request = OutboundRequest::chat("What is a monad?");
//! let json = codec::encode_request(&request).unwrap();
//! assert!(json.contains("\"action\":\"chat\""));
//!
//! let frame = codec::decode_frame(r#"{"request_id":"r1","status":"completed"}"#).unwrap();
//! assert!(matches!(frame.body, FrameBody::Completed { .. }));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, ErrorClass, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Action, Chunk, ChunkKind, FrameBody, FrontendCommand, HistoryMessage, InboundFrame,
    OutboundRequest, RequestBody, RequestId,
};
