//! Codec for the streaming chat protocol
//!
//! Outbound requests are serialized through private serde wire structs.
//! Inbound frames are decoded in two steps: the text is parsed into a
//! generic `serde_json::Value`, then the object is checked field by field
//! and turned into an [`InboundFrame`].
//!
//! # Strict Decoding
//!
//! Decoding never guesses. A frame either becomes a fully populated
//! `InboundFrame` or fails with a named error:
//!
//! - `MalformedFrame`: invalid JSON, not an object, missing or mistyped
//!   `request_id` / `status`, or a mistyped chunk field
//! - `MissingChunkPayload`: `status: chunk` without a `chunk` object
//! - `UnknownFrameVariant`: unrecognized `status` or `chunk.type`
//!
//! Backend protocol drift therefore shows up as an error event instead of
//! silently producing empty output.
//!
//! # Examples
//!
//! ```rust
//! use streamchat_core::{codec, FrameBody};
//!
//! let frame = codec::decode_frame(
//!     r#"{"request_id":"r1","status":"chunk","chunk":{"type":"text","data":"Hi"}}"#,
//! ).unwrap();
//! assert_eq!(frame.request_id, "r1");
//! assert!(matches!(frame.body, FrameBody::Chunk(_)));
//! ```

use crate::error::{Error, Result};
use crate::types::{
    Action, Chunk, ChunkKind, FrameBody, FrontendCommand, InboundFrame, OutboundRequest,
    RequestBody, RequestId,
};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Serialize)]
struct WireRequest<'a> {
    action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<WirePayload<'a>>,
    request_id: &'a RequestId,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePayload<'a> {
    Chat { text: &'a str },
    Command { command: FrontendCommand },
}

/// Encode any serializable value to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode an outbound request to its wire form
///
/// `clear_session` requests carry no `payload` key at all.
///
/// ```rust
/// use streamchat_core::{codec, OutboundRequest};
///
/// let json = codec::encode_request(&OutboundRequest::chat("hello")).unwrap();
/// assert!(json.contains(r#""action":"chat""#));
/// assert!(json.contains(r#""payload":{"text":"hello"}"#));
/// ```
pub fn encode_request(request: &OutboundRequest) -> Result<String> {
    let payload = match &request.body {
        RequestBody::Chat { text } => Some(WirePayload::Chat { text }),
        RequestBody::FrontendCommand { command } => Some(WirePayload::Command { command: *command }),
        RequestBody::ClearSession => None,
    };
    encode(&WireRequest {
        action: request.action(),
        payload,
        request_id: &request.request_id,
    })
}

/// Decode an outbound request from its wire form
///
/// The client never receives requests; this is the inverse of
/// [`encode_request`] for backends and test doubles that need to read what
/// the client sent. It is as strict as [`decode_frame`].
pub fn decode_request(data: &str) -> Result<OutboundRequest> {
    let mut obj = parse_object(data)?;

    let request_id = take_required_str(&mut obj, "request_id")?;
    let action = take_required_str(&mut obj, "action")?;
    let payload = obj.remove("payload");

    let body = match action.as_str() {
        "chat" => {
            let mut payload = expect_payload(payload, "chat")?;
            let text = take_required_str(&mut payload, "text")?;
            RequestBody::Chat { text }
        }
        "frontend_command" => {
            let mut payload = expect_payload(payload, "frontend_command")?;
            let command = take_required_str(&mut payload, "command")?;
            let command = match command.as_str() {
                "ping" => FrontendCommand::Ping,
                "get_history" => FrontendCommand::GetHistory,
                "clear_history" => FrontendCommand::ClearHistory,
                "get_config" => FrontendCommand::GetConfig,
                other => return Err(Error::unknown_variant("command", other)),
            };
            RequestBody::FrontendCommand { command }
        }
        "clear_session" => RequestBody::ClearSession,
        other => return Err(Error::unknown_variant("action", other)),
    };

    Ok(OutboundRequest {
        request_id: RequestId::from(request_id),
        body,
    })
}

enum Status {
    Processing,
    Chunk,
    Completed,
    Error,
    Init,
    Success,
}

impl Status {
    fn parse(status: &str) -> Result<Self> {
        match status {
            "processing" => Ok(Status::Processing),
            "chunk" => Ok(Status::Chunk),
            "completed" | "complete" => Ok(Status::Completed),
            "error" => Ok(Status::Error),
            "init" => Ok(Status::Init),
            "success" => Ok(Status::Success),
            other => Err(Error::unknown_variant("status", other)),
        }
    }
}

/// Decode an inbound frame
///
/// See the module documentation for the failure modes.
pub fn decode_frame(data: &str) -> Result<InboundFrame> {
    let mut obj = parse_object(data)?;

    let (request_id, status) = match (obj.remove("request_id"), obj.remove("status")) {
        (Some(Value::String(id)), Some(Value::String(status))) => (id, status),
        (Some(id), Some(status)) if !id.is_string() || !status.is_string() => {
            return Err(Error::MalformedFrame(
                "request_id and status must be strings".to_string(),
            ));
        }
        (id, status) => {
            let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            if id.is_some() {
                keys.push("request_id");
            }
            if status.is_some() {
                keys.push("status");
            }
            keys.sort_unstable();
            return Err(Error::MalformedFrame(format!(
                "missing required fields (request_id, status). Got: {:?}",
                keys
            )));
        }
    };

    // Status first, so drift reports name the status rather than a bad chunk
    let status = Status::parse(&status)?;

    let chunk = match obj.remove("chunk") {
        None | Some(Value::Null) => None,
        Some(value) => Some(decode_chunk(value)?),
    };

    let body = match status {
        Status::Processing => FrameBody::Processing {
            user_message: take_optional_str(&mut obj, "user_message")?.unwrap_or_default(),
        },
        Status::Chunk => match chunk {
            Some(chunk) => FrameBody::Chunk(chunk),
            None => return Err(Error::MissingChunkPayload { request_id }),
        },
        Status::Completed => FrameBody::Completed { chunk },
        Status::Error => {
            let message = match take_optional_str(&mut obj, "error")? {
                Some(message) => message,
                None => chunk
                    .as_ref()
                    .and_then(Chunk::data_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            };
            let recoverable = match obj.remove("recoverable") {
                None | Some(Value::Null) => chunk
                    .as_ref()
                    .and_then(|c| c.metadata.get("recoverable"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                Some(Value::Bool(flag)) => flag,
                Some(_) => {
                    return Err(Error::MalformedFrame(
                        "recoverable must be a boolean".to_string(),
                    ))
                }
            };
            FrameBody::Error {
                message,
                recoverable,
                chunk,
            }
        }
        Status::Init => FrameBody::Init { chunk },
        Status::Success => FrameBody::Success { chunk },
    };

    Ok(InboundFrame {
        request_id: RequestId::from(request_id),
        body,
    })
}

/// Encode an inbound frame to its wire form
///
/// Used by backends and test doubles; the client itself only decodes frames.
pub fn encode_frame(frame: &InboundFrame) -> Result<String> {
    encode(&frame_to_value(frame))
}

/// Build the JSON object for an inbound frame
pub fn frame_to_value(frame: &InboundFrame) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "request_id".to_string(),
        Value::String(frame.request_id.to_string()),
    );
    obj.insert(
        "status".to_string(),
        Value::String(frame.status().to_string()),
    );

    match &frame.body {
        FrameBody::Processing { user_message } => {
            if !user_message.is_empty() {
                obj.insert(
                    "user_message".to_string(),
                    Value::String(user_message.clone()),
                );
            }
        }
        FrameBody::Error {
            message,
            recoverable,
            ..
        } => {
            obj.insert("error".to_string(), Value::String(message.clone()));
            if *recoverable {
                obj.insert("recoverable".to_string(), Value::Bool(true));
            }
        }
        _ => {}
    }

    if let Some(chunk) = frame.body.chunk() {
        obj.insert("chunk".to_string(), chunk_to_value(chunk));
    }

    Value::Object(obj)
}

fn chunk_to_value(chunk: &Chunk) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "type".to_string(),
        Value::String(chunk.kind.as_str().to_string()),
    );
    obj.insert("data".to_string(), chunk.data.clone());
    if !chunk.metadata.is_empty() {
        obj.insert("metadata".to_string(), Value::Object(chunk.metadata.clone()));
    }
    Value::Object(obj)
}

fn decode_chunk(value: Value) -> Result<Chunk> {
    let Value::Object(mut obj) = value else {
        return Err(Error::MalformedFrame("chunk must be an object".to_string()));
    };

    let kind = match obj.remove("type") {
        Some(Value::String(kind)) => {
            ChunkKind::parse(&kind).ok_or_else(|| Error::unknown_variant("chunk.type", kind))?
        }
        Some(_) => return Err(Error::MalformedFrame("chunk.type must be a string".to_string())),
        None => return Err(Error::MalformedFrame("chunk missing type".to_string())),
    };

    let data = obj.remove("data").unwrap_or(Value::Null);
    let data = match (kind, data) {
        (ChunkKind::Text, Value::Null) => Value::String(String::new()),
        (ChunkKind::Text, Value::String(text)) => Value::String(text),
        (ChunkKind::Text, _) => {
            return Err(Error::MalformedFrame(
                "text chunk data must be a string".to_string(),
            ))
        }
        (_, data) => data,
    };

    let metadata = match obj.remove("metadata") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(Error::MalformedFrame(
                "chunk.metadata must be an object".to_string(),
            ))
        }
    };

    Ok(Chunk {
        kind,
        data,
        metadata,
    })
}

fn parse_object(data: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| Error::MalformedFrame(format!("invalid JSON: {}", e)))?;
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(Error::MalformedFrame(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn expect_payload(payload: Option<Value>, action: &str) -> Result<Map<String, Value>> {
    match payload {
        Some(Value::Object(obj)) => Ok(obj),
        _ => Err(Error::MalformedFrame(format!(
            "{} request requires a payload object",
            action
        ))),
    }
}

fn take_required_str(obj: &mut Map<String, Value>, key: &str) -> Result<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(Error::MalformedFrame(format!("{} must be a string", key))),
        None => Err(Error::MalformedFrame(format!("missing required field {}", key))),
    }
}

fn take_optional_str(obj: &mut Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::MalformedFrame(format!("{} must be a string", key))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
