//! Frame dispatcher
//!
//! Turns decoded frames into [`ClientEvent`]s, one frame at a time, in
//! arrival order. The protocol is single-flight: at most one streaming
//! session is tracked, keyed by the request id of its `processing` frame.
//!
//! ```text
//! processing(r1) ──▶ Processing ──chunk(text)──▶ Streaming ──completed──▶ Completed
//!                        │                           │
//!                        └────────── error ──────────┴──────────────────▶ Errored
//! ```
//!
//! Text chunks are the latency-critical path: each one produces exactly one
//! `ChunkReceived` before the next frame is looked at. Frames for request
//! ids that are not tracked are logged and dropped.

use crate::config::ConfigProvider;
use crate::events::ClientEvent;
use crate::metrics::ClientMetrics;
use crate::provider::{find_descriptor, ProviderProfile};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamchat_core::{
    codec, Chunk, ChunkKind, Error, FrameBody, HistoryMessage, InboundFrame, RequestId,
};

/// Chunks between two latency log lines
const LATENCY_LOG_INTERVAL: u64 = 100;

/// The response currently being streamed
#[derive(Debug, Clone)]
pub struct StreamingSession {
    pub request_id: RequestId,
    /// Every text chunk received so far
    pub content: String,
    pub started_at: Instant,
    streaming: bool,
}

impl StreamingSession {
    fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            content: String::new(),
            started_at: Instant::now(),
            streaming: false,
        }
    }

    /// `true` once the first text chunk arrived
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// Inter-chunk latency tracking
#[derive(Debug, Default)]
struct ChunkTimer {
    last_chunk: Option<Instant>,
    count: u64,
    window_total: Duration,
    window_samples: u32,
}

impl ChunkTimer {
    /// Register a chunk and return the gap since the previous one
    fn tick(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let gap = self.last_chunk.map(|last| now.duration_since(last));
        self.last_chunk = Some(now);
        self.count += 1;

        if let Some(gap) = gap {
            self.window_total += gap;
            self.window_samples += 1;
        }

        if self.count % LATENCY_LOG_INTERVAL == 0 && self.window_samples > 0 {
            let avg = self.window_total / self.window_samples;
            tracing::debug!(
                chunks = self.count,
                avg_latency_ms = avg.as_secs_f64() * 1000.0,
                "Chunk latency"
            );
            self.window_total = Duration::ZERO;
            self.window_samples = 0;
        }

        gap
    }

    fn reset(&mut self) {
        self.last_chunk = None;
    }
}

/// Per-connection frame dispatcher
pub struct FrameDispatcher {
    session: Option<StreamingSession>,
    profile: ProviderProfile,
    config: Arc<dyn ConfigProvider>,
    timer: ChunkTimer,
    metrics: Option<Arc<ClientMetrics>>,
}

impl FrameDispatcher {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            session: None,
            profile: ProviderProfile::default(),
            config,
            timer: ChunkTimer::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn session(&self) -> Option<&StreamingSession> {
        self.session.as_ref()
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// Drop the tracked session, e.g. when the connection is lost
    pub fn reset_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(
                request_id = %session.request_id,
                "Dropping streaming session"
            );
        }
        self.timer.reset();
    }

    /// Decode a text message and dispatch it
    ///
    /// Decode failures become an `ErrorOccurred` event; the caller keeps
    /// reading.
    pub fn handle_text(&mut self, text: &str) -> Option<ClientEvent> {
        match codec::decode_frame(text) {
            Ok(frame) => self.dispatch(frame),
            Err(error) => {
                tracing::error!(error = %error, payload = %text, "Failed to decode frame");
                if let Some(metrics) = &self.metrics {
                    metrics.record_decode_error();
                }
                Some(ClientEvent::ErrorOccurred(error))
            }
        }
    }

    /// Dispatch one decoded frame
    pub fn dispatch(&mut self, frame: InboundFrame) -> Option<ClientEvent> {
        if let Some(metrics) = &self.metrics {
            metrics.record_frame(frame.status());
        }
        let InboundFrame { request_id, body } = frame;

        match body {
            FrameBody::Processing { user_message } => self.on_processing(request_id, user_message),
            FrameBody::Chunk(chunk) => self.on_chunk(request_id, chunk),
            FrameBody::Error {
                message,
                recoverable,
                ..
            } => self.on_error(request_id, message, recoverable),
            FrameBody::Completed { chunk } | FrameBody::Success { chunk } => {
                self.on_completed(request_id, chunk)
            }
            FrameBody::Init { chunk } => match chunk {
                Some(chunk) if chunk.kind == ChunkKind::ConversationHistory => {
                    Some(history_event(&chunk))
                }
                Some(chunk) if chunk.kind == ChunkKind::Metadata => self.on_metadata(&chunk),
                _ => {
                    tracing::debug!(request_id = %request_id, "Init frame without history");
                    None
                }
            },
        }
    }

    fn on_processing(&mut self, request_id: RequestId, user_message: String) -> Option<ClientEvent> {
        if let Some(previous) = &self.session {
            if previous.request_id == request_id {
                tracing::debug!(request_id = %request_id, "Duplicate processing frame");
                return None;
            }
            tracing::warn!(
                previous = %previous.request_id,
                request_id = %request_id,
                "New request started before the previous one finished"
            );
        }

        tracing::debug!(request_id = %request_id, "Streaming session started");
        self.timer.reset();
        self.session = Some(StreamingSession::new(request_id.clone()));
        Some(ClientEvent::MessageStarted {
            request_id,
            user_message,
        })
    }

    fn on_chunk(&mut self, request_id: RequestId, chunk: Chunk) -> Option<ClientEvent> {
        match chunk.kind {
            ChunkKind::Text => self.on_text(request_id, chunk),
            ChunkKind::Metadata => self.on_metadata(&chunk),
            ChunkKind::Error => {
                let message = chunk.data_str().unwrap_or("Unknown error").to_string();
                let recoverable = chunk
                    .metadata
                    .get("recoverable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.on_error(request_id, message, recoverable)
            }
            ChunkKind::SessionCleared => Some(session_cleared_event(&chunk)),
            ChunkKind::ConversationHistory => Some(history_event(&chunk)),
            ChunkKind::Image | ChunkKind::Audio | ChunkKind::Binary => {
                tracing::info!(
                    request_id = %request_id,
                    kind = chunk.kind.as_str(),
                    "Ignoring non-text chunk"
                );
                None
            }
        }
    }

    fn on_text(&mut self, request_id: RequestId, chunk: Chunk) -> Option<ClientEvent> {
        let Some(session) = self.session.as_mut().filter(|s| s.request_id == request_id) else {
            tracing::warn!(request_id = %request_id, "Text chunk for untracked request, ignoring");
            return None;
        };

        let text = match chunk.data {
            Value::String(text) => text,
            _ => String::new(),
        };
        session.streaming = true;
        session.content.push_str(&text);

        let gap = self.timer.tick();
        if let Some(metrics) = &self.metrics {
            metrics.record_chunk(gap.map(|g| g.as_secs_f64()));
        }

        Some(ClientEvent::ChunkReceived { request_id, text })
    }

    fn on_metadata(&mut self, chunk: &Chunk) -> Option<ClientEvent> {
        let descriptor = find_descriptor(&chunk.data, &chunk.metadata)?;
        if !self.profile.update(descriptor) {
            return None;
        }

        let info = self.profile.info().clone();
        tracing::info!(
            provider = %info.provider,
            model = %info.model,
            orchestrator = %info.orchestrator,
            "Provider detected"
        );
        Some(ClientEvent::ProviderDetected(info))
    }

    fn on_error(
        &mut self,
        request_id: RequestId,
        message: String,
        recoverable: bool,
    ) -> Option<ClientEvent> {
        let tuning = self.config.tuning_for(self.profile.kind());
        if recoverable && tuning.use_recoverable_errors {
            tracing::warn!(
                request_id = %request_id,
                error = %message,
                provider = %self.profile.kind(),
                "Recoverable backend error"
            );
            return None;
        }

        if self
            .session
            .as_ref()
            .is_some_and(|s| s.request_id == request_id)
        {
            self.session = None;
            self.timer.reset();
        }

        tracing::error!(request_id = %request_id, error = %message, "Backend error");
        Some(ClientEvent::ErrorOccurred(Error::Backend {
            request_id: request_id.into_string(),
            message,
        }))
    }

    fn on_completed(&mut self, request_id: RequestId, chunk: Option<Chunk>) -> Option<ClientEvent> {
        match chunk.as_ref().map(|c| c.kind) {
            Some(ChunkKind::SessionCleared) => {
                return chunk.as_ref().map(session_cleared_event);
            }
            Some(ChunkKind::ConversationHistory) => {
                return chunk.as_ref().map(history_event);
            }
            _ => {}
        }

        match self.session.take() {
            Some(session) if session.request_id == request_id => {
                self.timer.reset();
                tracing::debug!(
                    request_id = %request_id,
                    elapsed_ms = session.started_at.elapsed().as_millis() as u64,
                    chars = session.content.len(),
                    "Streaming session completed"
                );
                Some(ClientEvent::MessageCompleted {
                    request_id,
                    content: session.content,
                })
            }
            other => {
                self.session = other;
                tracing::debug!(request_id = %request_id, "Completion for untracked request, ignoring");
                None
            }
        }
    }
}

fn session_cleared_event(chunk: &Chunk) -> ClientEvent {
    let new_id = chunk.metadata_str("new_conversation_id").unwrap_or_default();
    let old_id = chunk.metadata_str("old_conversation_id").unwrap_or_default();
    tracing::info!(new_id, old_id, "Session cleared");
    ClientEvent::SessionCleared {
        new_id: new_id.to_string(),
        old_id: old_id.to_string(),
    }
}

fn history_event(chunk: &Chunk) -> ClientEvent {
    // Either a bare list or {"messages": [...]}
    let messages = match &chunk.data {
        Value::Object(obj) => obj.get("messages").cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    match serde_json::from_value::<Vec<HistoryMessage>>(messages) {
        Ok(history) => {
            tracing::debug!(messages = history.len(), "History loaded");
            ClientEvent::HistoryLoaded(history)
        }
        Err(e) => {
            tracing::error!(error = %e, data = %chunk.data, "Invalid conversation history");
            ClientEvent::ErrorOccurred(Error::MalformedFrame(format!(
                "invalid conversation_history: {}",
                e
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionEndpoint, StaticConfig};
    use serde_json::json;

    fn dispatcher() -> FrameDispatcher {
        FrameDispatcher::new(Arc::new(StaticConfig::new(ConnectionEndpoint::default())))
    }

    fn feed(dispatcher: &mut FrameDispatcher, frames: &[Value]) -> Vec<ClientEvent> {
        frames
            .iter()
            .filter_map(|frame| dispatcher.handle_text(&frame.to_string()))
            .collect()
    }

    fn chunk_text(id: &str, text: &str) -> Value {
        json!({"request_id": id, "status": "chunk", "chunk": {"type": "text", "data": text}})
    }

    #[test]
    fn test_streaming_sequence() {
        let mut d = dispatcher();
        let events = feed(
            &mut d,
            &[
                json!({"request_id": "r1", "status": "processing"}),
                chunk_text("r1", "Hello"),
                chunk_text("r1", " world"),
                json!({"request_id": "r1", "status": "completed"}),
            ],
        );

        assert_eq!(
            events,
            vec![
                ClientEvent::MessageStarted {
                    request_id: "r1".into(),
                    user_message: String::new(),
                },
                ClientEvent::ChunkReceived {
                    request_id: "r1".into(),
                    text: "Hello".into(),
                },
                ClientEvent::ChunkReceived {
                    request_id: "r1".into(),
                    text: " world".into(),
                },
                ClientEvent::MessageCompleted {
                    request_id: "r1".into(),
                    content: "Hello world".into(),
                },
            ]
        );
        assert!(d.session().is_none());
    }

    #[test]
    fn test_chunks_are_never_coalesced() {
        let mut d = dispatcher();
        let mut frames = vec![json!({"request_id": "r1", "status": "processing"})];
        frames.extend((0..250).map(|i| chunk_text("r1", &i.to_string())));

        let texts: Vec<String> = feed(&mut d, &frames)
            .into_iter()
            .filter_map(|event| match event {
                ClientEvent::ChunkReceived { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = (0..250).map(|i| i.to_string()).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_missing_chunk_payload_becomes_error_event() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);

        let events = feed(&mut d, &[json!({"request_id": "r1", "status": "chunk"})]);
        assert_eq!(
            events,
            vec![ClientEvent::ErrorOccurred(Error::MissingChunkPayload {
                request_id: "r1".into()
            })]
        );
        // The session survives a bad frame
        assert!(d.session().is_some());
    }

    #[test]
    fn test_unknown_status_is_surfaced() {
        let mut d = dispatcher();
        let events = feed(&mut d, &[json!({"request_id": "r1", "status": "thinking"})]);
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::ErrorOccurred(Error::UnknownFrameVariant { value, .. })] if value == "thinking"
        ));
    }

    #[test]
    fn test_untracked_frames_are_ignored() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);

        let events = feed(
            &mut d,
            &[
                chunk_text("stale", "late"),
                json!({"request_id": "stale", "status": "completed"}),
            ],
        );
        assert!(events.is_empty());
        assert_eq!(
            d.session().map(|s| s.request_id.clone()),
            Some(RequestId::from("r1"))
        );
    }

    #[test]
    fn test_session_cleared_does_not_complete() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);

        let events = feed(
            &mut d,
            &[json!({
                "request_id": "r1",
                "status": "completed",
                "chunk": {
                    "type": "session_cleared",
                    "data": null,
                    "metadata": {"new_conversation_id": "c2", "old_conversation_id": "c1"}
                }
            })],
        );
        assert_eq!(
            events,
            vec![ClientEvent::SessionCleared {
                new_id: "c2".into(),
                old_id: "c1".into()
            }]
        );
        assert!(d.session().is_some());
    }

    #[test]
    fn test_error_status_ends_session() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);

        let events = feed(
            &mut d,
            &[json!({"request_id": "r1", "status": "error", "error": "rate limited"})],
        );
        assert_eq!(
            events,
            vec![ClientEvent::ErrorOccurred(Error::Backend {
                request_id: "r1".into(),
                message: "rate limited".into()
            })]
        );
        assert!(d.session().is_none());
    }

    #[test]
    fn test_error_chunk_uses_data_as_message() {
        let mut d = dispatcher();
        let events = feed(
            &mut d,
            &[json!({"request_id": "r9", "status": "chunk", "chunk": {"type": "error", "data": "boom"}})],
        );
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::ErrorOccurred(Error::Backend { message, .. })] if message == "boom"
        ));
    }

    #[test]
    fn test_recoverable_error_downgraded_for_anthropic() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &[
                json!({"request_id": "r1", "status": "processing"}),
                json!({
                    "request_id": "r1",
                    "status": "chunk",
                    "chunk": {"type": "metadata", "data": null, "metadata": {"provider": "anthropic", "model": "m"}}
                }),
            ],
        );

        let events = feed(
            &mut d,
            &[json!({"request_id": "r1", "status": "error", "error": "overloaded", "recoverable": true})],
        );
        assert!(events.is_empty());
        assert!(d.session().is_some());
    }

    #[test]
    fn test_recoverable_error_surfaced_for_openai() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &[json!({
                "request_id": "r0",
                "status": "chunk",
                "chunk": {"type": "metadata", "data": {"provider": "openai", "model": "gpt"}}
            })],
        );

        let events = feed(
            &mut d,
            &[json!({"request_id": "r1", "status": "error", "error": "overloaded", "recoverable": true})],
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_provider_detected_only_on_change() {
        let mut d = dispatcher();
        let metadata = json!({
            "request_id": "r1",
            "status": "chunk",
            "chunk": {
                "type": "metadata",
                "data": null,
                "metadata": {"provider_info": {"provider": "anthropic", "model": "claude", "orchestrator_type": "direct"}}
            }
        });

        let events = feed(&mut d, &[metadata.clone(), metadata]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ClientEvent::ProviderDetected(info) => {
                assert_eq!(info.provider, "anthropic");
                assert_eq!(info.model, "claude");
                assert_eq!(info.orchestrator, "direct");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_history_on_init() {
        let mut d = dispatcher();
        let events = feed(
            &mut d,
            &[json!({
                "request_id": "conn",
                "status": "init",
                "chunk": {
                    "type": "conversation_history",
                    "data": [
                        {"role": "user", "content": "hi"},
                        {"role": "assistant", "content": "hello", "timestamp": "2024-01-01T00:00:00Z"}
                    ]
                }
            })],
        );
        match events.as_slice() {
            [ClientEvent::HistoryLoaded(history)] => {
                assert_eq!(history.len(), 2);
                assert_eq!(history[1].timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_history_in_success_frame() {
        let mut d = dispatcher();
        let events = feed(
            &mut d,
            &[json!({
                "request_id": "h1",
                "status": "success",
                "chunk": {"type": "conversation_history", "data": {"messages": []}}
            })],
        );
        assert_eq!(events, vec![ClientEvent::HistoryLoaded(Vec::new())]);
    }

    #[test]
    fn test_invalid_history_is_an_error() {
        let mut d = dispatcher();
        let events = feed(
            &mut d,
            &[json!({
                "request_id": "conn",
                "status": "init",
                "chunk": {"type": "conversation_history", "data": "nope"}
            })],
        );
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::ErrorOccurred(Error::MalformedFrame(_))]
        ));
    }

    #[test]
    fn test_binary_chunks_are_logged_only() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);
        let events = feed(
            &mut d,
            &[json!({"request_id": "r1", "status": "chunk", "chunk": {"type": "image", "data": "aGk="}})],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_new_processing_supersedes_session() {
        let mut d = dispatcher();
        feed(
            &mut d,
            &[
                json!({"request_id": "r1", "status": "processing"}),
                chunk_text("r1", "partial"),
                json!({"request_id": "r2", "status": "processing", "user_message": "again"}),
            ],
        );
        let session = d.session().unwrap();
        assert_eq!(session.request_id, "r2");
        assert!(session.content.is_empty());
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_reset_session() {
        let mut d = dispatcher();
        feed(&mut d, &[json!({"request_id": "r1", "status": "processing"})]);
        d.reset_session();
        assert!(d.session().is_none());
    }
}
