//! Common test utilities for streamchat-client integration tests
//!
//! A scripted chat backend built on `accept_async`: it records every
//! request it receives, answers with frames produced by a script, can push
//! greeting frames on connect, and can drop all live connections on demand.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamchat_client::{ClientEvent, ConnectionEndpoint, EventReceiver};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

type Script = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// Mock chat backend
pub struct MockChatServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    kick_tx: broadcast::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    received_rx: mpsc::UnboundedReceiver<Value>,
}

impl MockChatServer {
    /// Backend that never answers
    pub async fn silent() -> Self {
        Self::start(Vec::new(), |_| Vec::new()).await
    }

    /// Backend that answers every chat request with a streamed reply
    pub async fn streaming(chunks: &'static [&'static str]) -> Self {
        Self::start(Vec::new(), move |request| {
            match request["action"].as_str() {
                Some("chat") => {
                    let id = request["request_id"].as_str().unwrap_or_default();
                    streamed_reply(id, chunks)
                }
                _ => Vec::new(),
            }
        })
        .await
    }

    /// Backend sending `greeting` on every new connection and answering
    /// each request with the frames `script` returns
    pub async fn start<F>(greeting: Vec<String>, script: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        init_test_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let script: Script = Arc::new(script);
        let connections = Arc::new(AtomicUsize::new(0));
        let (kick_tx, _) = broadcast::channel::<()>(8);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<Value>();

        let accepted = connections.clone();
        let kick = kick_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let script = script.clone();
                        let greeting = greeting.clone();
                        let received_tx = received_tx.clone();
                        let mut kick_rx = kick.subscribe();
                        accepted.fetch_add(1, Ordering::SeqCst);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            for frame in greeting {
                                if write.send(Message::Text(frame)).await.is_err() {
                                    return;
                                }
                            }

                            loop {
                                tokio::select! {
                                    _ = kick_rx.recv() => {
                                        let _ = write.send(Message::Close(None)).await;
                                        return;
                                    }
                                    message = read.next() => match message {
                                        Some(Ok(Message::Text(text))) => {
                                            let request: Value = match serde_json::from_str(&text) {
                                                Ok(value) => value,
                                                Err(_) => continue,
                                            };
                                            let replies = script(&request);
                                            let _ = received_tx.send(request);
                                            for reply in replies {
                                                if write.send(Message::Text(reply)).await.is_err() {
                                                    return;
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                                        Some(Ok(_)) => {}
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            kick_tx,
            shutdown_tx,
            received_rx,
        }
    }

    pub fn endpoint(&self) -> ConnectionEndpoint {
        ConnectionEndpoint::new("127.0.0.1", self.addr.port(), false)
    }

    /// Number of accepted TCP connections so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Close every live connection from the server side
    pub fn kick(&self) {
        let _ = self.kick_tx.send(());
    }

    /// Next request received from the client
    pub async fn next_request(&mut self) -> Option<Value> {
        tokio::time::timeout(EVENT_TIMEOUT, self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn shutdown(self) {
        self.kick();
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Route client logs through the test harness (`RUST_LOG` to enable)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A local port nothing listens on
pub async fn refused_endpoint() -> ConnectionEndpoint {
    init_test_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ConnectionEndpoint::new("127.0.0.1", port, false)
}

pub fn processing(request_id: &str) -> String {
    json!({"request_id": request_id, "status": "processing"}).to_string()
}

pub fn text_chunk(request_id: &str, text: &str) -> String {
    json!({
        "request_id": request_id,
        "status": "chunk",
        "chunk": {"type": "text", "data": text, "metadata": {}}
    })
    .to_string()
}

pub fn completed(request_id: &str) -> String {
    json!({"request_id": request_id, "status": "completed"}).to_string()
}

/// processing, one text chunk per entry, completed
pub fn streamed_reply(request_id: &str, chunks: &[&str]) -> Vec<String> {
    let mut frames = vec![processing(request_id)];
    frames.extend(chunks.iter().map(|chunk| text_chunk(request_id, chunk)));
    frames.push(completed(request_id));
    frames
}

/// Next event, or `None` after the timeout
pub async fn next_event(events: &mut EventReceiver) -> Option<ClientEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .ok()
        .flatten()
}

/// Collect events until `stop` matches one (inclusive)
pub async fn events_until<F>(events: &mut EventReceiver, stop: F) -> Vec<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    let mut collected = Vec::new();
    while let Some(event) = next_event(events).await {
        let done = stop(&event);
        collected.push(event);
        if done {
            break;
        }
    }
    collected
}

/// Wait for `ConnectivityChanged(expected)`, skipping anything else
pub async fn wait_connectivity(events: &mut EventReceiver, expected: bool) -> bool {
    let collected =
        events_until(events, |e| *e == ClientEvent::ConnectivityChanged(expected)).await;
    collected.last() == Some(&ClientEvent::ConnectivityChanged(expected))
}

/// Assert nothing arrives within `window`
pub async fn assert_quiet(events: &mut EventReceiver, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, events.recv()).await {
        panic!("unexpected event {:?}", event);
    }
}
