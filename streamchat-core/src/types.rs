//! Wire types for the streaming chat protocol
//!
//! The protocol exchanges JSON objects over one persistent WebSocket.
//!
//! # Outbound
//!
//! ```text
//! {"action": "chat" | "frontend_command" | "clear_session",
//!  "payload": {...},            // absent for clear_session
//!  "request_id": "<uuid>"}
//! ```
//!
//! # Inbound
//!
//! ```text
//! {"request_id": "<uuid>",
//!  "status": "processing" | "chunk" | "completed" | "error" | "init" | "success",
//!  "chunk": {"type": "text" | "metadata" | ..., "data": ..., "metadata": {...}}}
//! ```
//!
//! Inbound frames are modelled as a tagged union on `status` ([`FrameBody`]),
//! so every consumer matches exhaustively instead of probing optional keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Globally unique request identifier
///
/// Generated client-side for every outbound request (UUID v4) and echoed by
/// the backend on every frame that belongs to that request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        RequestId(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

impl PartialEq<str> for RequestId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RequestId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Outbound action discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A user chat message
    Chat,
    /// A control command for the backend
    FrontendCommand,
    /// Start a fresh conversation
    ClearSession,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Chat => "chat",
            Action::FrontendCommand => "frontend_command",
            Action::ClearSession => "clear_session",
        }
    }
}

/// Commands carried by a `frontend_command` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontendCommand {
    /// Liveness check
    Ping,
    /// Ask for the conversation history
    GetHistory,
    /// Wipe the stored conversation history
    ClearHistory,
    /// Ask for the backend configuration
    GetConfig,
}

impl FrontendCommand {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontendCommand::Ping => "ping",
            FrontendCommand::GetHistory => "get_history",
            FrontendCommand::ClearHistory => "clear_history",
            FrontendCommand::GetConfig => "get_config",
        }
    }
}

/// Action-specific content of an outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `{"text": ...}`
    Chat { text: String },
    /// `{"command": ...}`
    FrontendCommand { command: FrontendCommand },
    /// No payload
    ClearSession,
}

impl RequestBody {
    /// The action this body is sent under
    pub fn action(&self) -> Action {
        match self {
            RequestBody::Chat { .. } => Action::Chat,
            RequestBody::FrontendCommand { .. } => Action::FrontendCommand,
            RequestBody::ClearSession => Action::ClearSession,
        }
    }
}

/// A request ready for transmission
///
/// Built by the client for a single send and dropped once written to the
/// socket; there is no resend cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Freshly generated identifier
    pub request_id: RequestId,
    /// Action and payload
    pub body: RequestBody,
}

impl OutboundRequest {
    /// Create a request with a fresh identifier
    pub fn new(body: RequestBody) -> Self {
        Self {
            request_id: RequestId::generate(),
            body,
        }
    }

    /// A `chat` request carrying the user's text
    pub fn chat(text: impl Into<String>) -> Self {
        Self::new(RequestBody::Chat { text: text.into() })
    }

    /// A `frontend_command` request
    pub fn command(command: FrontendCommand) -> Self {
        Self::new(RequestBody::FrontendCommand { command })
    }

    /// A `clear_session` request
    pub fn clear_session() -> Self {
        Self::new(RequestBody::ClearSession)
    }

    /// The action this request is sent under
    pub fn action(&self) -> Action {
        self.body.action()
    }
}

/// Type of a chunk inside an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Text,
    Metadata,
    Error,
    SessionCleared,
    ConversationHistory,
    Image,
    Audio,
    Binary,
}

impl ChunkKind {
    /// Parse a wire `chunk.type` value
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "text" => ChunkKind::Text,
            "metadata" => ChunkKind::Metadata,
            "error" => ChunkKind::Error,
            "session_cleared" => ChunkKind::SessionCleared,
            "conversation_history" => ChunkKind::ConversationHistory,
            "image" => ChunkKind::Image,
            "audio" => ChunkKind::Audio,
            "binary" => ChunkKind::Binary,
            _ => return None,
        })
    }

    /// Wire name of the chunk type
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Metadata => "metadata",
            ChunkKind::Error => "error",
            ChunkKind::SessionCleared => "session_cleared",
            ChunkKind::ConversationHistory => "conversation_history",
            ChunkKind::Image => "image",
            ChunkKind::Audio => "audio",
            ChunkKind::Binary => "binary",
        }
    }
}

/// Typed content attached to an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub kind: ChunkKind,
    /// Chunk body; always a string for [`ChunkKind::Text`]
    pub data: Value,
    /// Free-form metadata object (empty when absent on the wire)
    pub metadata: Map<String, Value>,
}

impl Chunk {
    /// Build a chunk with empty metadata
    pub fn new(kind: ChunkKind, data: Value) -> Self {
        Self {
            kind,
            data,
            metadata: Map::new(),
        }
    }

    /// A text chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ChunkKind::Text, Value::String(text.into()))
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// `data` as a string slice, if it is one
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_str()
    }

    /// Look up a string-valued metadata entry
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Status-specific content of an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// The backend accepted a request and is working on it
    Processing {
        /// Echo of the user's message, empty when the backend omits it
        user_message: String,
    },
    /// One piece of a streamed response
    Chunk(Chunk),
    /// The request finished (`completed`, or the older `complete`)
    Completed { chunk: Option<Chunk> },
    /// The backend reported a failure
    Error {
        message: String,
        recoverable: bool,
        chunk: Option<Chunk>,
    },
    /// Connection-scoped initial state pushed by the backend
    Init { chunk: Option<Chunk> },
    /// A command finished successfully
    Success { chunk: Option<Chunk> },
}

impl FrameBody {
    /// Wire status name of this body
    pub fn status(&self) -> &'static str {
        match self {
            FrameBody::Processing { .. } => "processing",
            FrameBody::Chunk(_) => "chunk",
            FrameBody::Completed { .. } => "completed",
            FrameBody::Error { .. } => "error",
            FrameBody::Init { .. } => "init",
            FrameBody::Success { .. } => "success",
        }
    }

    /// The chunk attached to this body, if any
    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            FrameBody::Processing { .. } => None,
            FrameBody::Chunk(chunk) => Some(chunk),
            FrameBody::Completed { chunk }
            | FrameBody::Error { chunk, .. }
            | FrameBody::Init { chunk }
            | FrameBody::Success { chunk } => chunk.as_ref(),
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub request_id: RequestId,
    pub body: FrameBody,
}

impl InboundFrame {
    /// Create a frame
    pub fn new(request_id: impl Into<RequestId>, body: FrameBody) -> Self {
        Self {
            request_id: request_id.into(),
            body,
        }
    }

    /// Wire status name of this frame
    pub fn status(&self) -> &'static str {
        self.body.status()
    }
}

/// One prior message in a `conversation_history` chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Author role (`user`, `assistant`, ...)
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}
