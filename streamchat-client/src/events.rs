//! Event surface
//!
//! Everything the connection worker has to tell the application arrives as
//! a [`ClientEvent`] on one ordered queue. The worker pushes without ever
//! blocking; the consumer pulls from whatever context it owns, typically a
//! UI tick calling [`EventReceiver::drain`].
//!
//! ```rust,no_run
//! # use streamchat_client::{ClientEvent, EventReceiver};
//! # fn tick(events: &mut EventReceiver) {
//! for event in events.drain() {
//!     match event {
//!         ClientEvent::ChunkReceived { text, .. } => print!("{}", text),
//!         ClientEvent::ConnectivityChanged(up) => println!("connected: {}", up),
//!         _ => {}
//!     }
//! }
//! # }
//! ```

use crate::provider::ProviderInfo;
use streamchat_core::{Error, HistoryMessage, RequestId};
use tokio::sync::mpsc;

/// A notification from the connection worker
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport came up (`true`) or went down (`false`)
    ConnectivityChanged(bool),
    /// The backend started working on a request
    MessageStarted {
        request_id: RequestId,
        user_message: String,
    },
    /// One piece of streamed response text
    ChunkReceived { request_id: RequestId, text: String },
    /// The request finished; `content` is every chunk concatenated
    MessageCompleted {
        request_id: RequestId,
        content: String,
    },
    /// Something failed; see [`Error::class`]
    ErrorOccurred(Error),
    /// The backend switched provider, model or orchestrator
    ProviderDetected(ProviderInfo),
    /// The backend started a new conversation
    SessionCleared { new_id: String, old_id: String },
    /// Prior messages of the current conversation
    HistoryLoaded(Vec<HistoryMessage>),
}

impl ClientEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::ConnectivityChanged(_) => "connectivity_changed",
            ClientEvent::MessageStarted { .. } => "message_started",
            ClientEvent::ChunkReceived { .. } => "chunk_received",
            ClientEvent::MessageCompleted { .. } => "message_completed",
            ClientEvent::ErrorOccurred(_) => "error_occurred",
            ClientEvent::ProviderDetected(_) => "provider_detected",
            ClientEvent::SessionCleared { .. } => "session_cleared",
            ClientEvent::HistoryLoaded(_) => "history_loaded",
        }
    }
}

/// Create a connected sender/receiver pair
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Worker side of the event queue
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl EventSender {
    /// Queue an event; never blocks
    ///
    /// If the receiver was dropped the event is logged and discarded.
    pub fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::debug!(event = name, "Event receiver dropped, discarding event");
        }
    }
}

/// Consumer side of the event queue
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once the client is gone and the queue is empty
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every queued event, in order
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block the current thread until the next event
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ClientEvent> {
        self.rx.blocking_recv()
    }
}
