//! Streaming chat client over WebSocket
//!
//! [`ChatClient`] is a handle to one persistent connection. The connection
//! itself lives on a dedicated worker thread running a single-threaded
//! tokio runtime; the handle only queues commands for it and reads the
//! shared status flags, so every method returns immediately and is safe to
//! call from a UI thread.
//!
//! # Worker Lifecycle
//!
//! 1. **Idle**: waiting for `connect()` or an endpoint change
//! 2. **Connect**: handshake with the configured endpoint and tuning
//! 3. **Serve**: read frames, write queued requests, send keepalive pings
//! 4. **Backoff**: wait out the reconnection delay, then back to 2
//!
//! Every failure becomes a [`ClientEvent`]; nothing is returned to the
//! caller once the client is built.

use crate::config::{ConfigProvider, ConnectionEndpoint};
use crate::connection_state::{ConnectionManager, ConnectionState, FailureOutcome, SharedStatus};
use crate::dispatcher::FrameDispatcher;
use crate::events::{ClientEvent, EventSender};
use crate::metrics::ClientMetrics;
use crate::provider::ProviderInfo;
use crate::reconnect::ReconnectionStrategy;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use streamchat_core::{codec, Error, FrontendCommand, OutboundRequest, RequestId, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Work handed from the client handle to the connection worker
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    UpdateEndpoint(ConnectionEndpoint),
    Send(OutboundRequest),
    Shutdown,
}

/// Settings the worker is started with
pub(crate) struct WorkerSettings {
    pub(crate) config: Arc<dyn ConfigProvider>,
    pub(crate) strategy: Box<dyn ReconnectionStrategy>,
    pub(crate) max_reconnect_attempts: u32,
    pub(crate) endpoint_switch_delay: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

struct WorkerHandle {
    thread: std::thread::JoinHandle<()>,
    done: std::sync::mpsc::Receiver<()>,
}

/// Handle to a streaming chat connection
///
/// Share it between threads with `Arc`. Dropping the last handle stops the
/// worker without waiting for it; call [`ChatClient::shutdown`] to wait.
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<SharedStatus>,
    worker: std::sync::Mutex<Option<WorkerHandle>>,
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Start the worker thread; the connection stays down until `connect()`
    pub(crate) fn spawn(settings: WorkerSettings, events: EventSender) -> Result<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let status = Arc::new(SharedStatus::default());
        let shutdown_timeout = settings.shutdown_timeout;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Io(format!("Failed to build worker runtime: {}", e)))?;

        let worker = Worker::new(settings, events, status.clone(), commands_rx);
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("streamchat-connection".to_string())
            .spawn(move || {
                runtime.block_on(worker.run());
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Io(format!("Failed to spawn connection worker: {}", e)))?;

        tracing::debug!("Connection worker started");

        Ok(Self {
            commands: commands_tx,
            status,
            worker: std::sync::Mutex::new(Some(WorkerHandle {
                thread,
                done: done_rx,
            })),
            shutdown_timeout,
        })
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            tracing::warn!(command = ?e.0, "Connection worker is gone, dropping command");
        }
    }

    /// Open the connection
    ///
    /// No-op while already connecting or connected. Resets the reconnection
    /// counter, so this is also how to recover after the retry ceiling.
    pub fn connect(&self) {
        self.submit(Command::Connect);
    }

    /// Close the connection and stop automatic reconnection
    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    /// Switch to another backend
    ///
    /// When the endpoint differs from the current one the connection is
    /// closed and re-opened against the new endpoint after a short delay.
    pub fn update_endpoint(&self, endpoint: ConnectionEndpoint) {
        self.submit(Command::UpdateEndpoint(endpoint));
    }

    /// Queue an outbound request, returning its id
    pub fn send(&self, request: OutboundRequest) -> RequestId {
        let request_id = request.request_id.clone();
        tracing::debug!(
            request_id = %request_id,
            action = request.action().as_str(),
            "Queueing request"
        );
        self.submit(Command::Send(request));
        request_id
    }

    /// Send a chat message
    pub fn send_message(&self, text: impl Into<String>) -> RequestId {
        self.send(OutboundRequest::chat(text))
    }

    /// Ask the backend to start a new conversation
    pub fn clear_session(&self) -> RequestId {
        self.send(OutboundRequest::clear_session())
    }

    pub fn send_command(&self, command: FrontendCommand) -> RequestId {
        self.send(OutboundRequest::command(command))
    }

    pub fn ping(&self) -> RequestId {
        self.send_command(FrontendCommand::Ping)
    }

    pub fn get_history(&self) -> RequestId {
        self.send_command(FrontendCommand::GetHistory)
    }

    pub fn clear_history(&self) -> RequestId {
        self.send_command(FrontendCommand::ClearHistory)
    }

    pub fn get_config(&self) -> RequestId {
        self.send_command(FrontendCommand::GetConfig)
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Provider, model and orchestrator last reported by the backend
    pub fn provider_info(&self) -> ProviderInfo {
        self.status.provider_info()
    }

    /// Stop the worker and wait for it, up to the shutdown timeout
    ///
    /// A worker that does not stop in time is left detached and logged.
    pub fn shutdown(&self) {
        self.submit(Command::Shutdown);

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        match handle.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                if handle.thread.join().is_err() {
                    tracing::error!("Connection worker panicked");
                }
                tracing::info!("Connection worker stopped");
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs_f64(),
                    "Connection worker did not stop in time, detaching"
                );
            }
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

enum Phase {
    Idle,
    Connect,
    Backoff(Duration),
    Stop,
}

/// How a served connection ended
enum LinkEnd {
    Lost(Error),
    Disconnected,
    Switched,
    Shutdown,
}

/// Connection worker; everything here runs on the worker thread
struct Worker {
    config: Arc<dyn ConfigProvider>,
    endpoint_override: Option<ConnectionEndpoint>,
    manager: ConnectionManager,
    dispatcher: FrameDispatcher,
    events: EventSender,
    status: Arc<SharedStatus>,
    commands: mpsc::UnboundedReceiver<Command>,
    switch_delay: Duration,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Worker {
    fn new(
        settings: WorkerSettings,
        events: EventSender,
        status: Arc<SharedStatus>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let mut dispatcher = FrameDispatcher::new(settings.config.clone());
        if let Some(metrics) = &settings.metrics {
            dispatcher = dispatcher.with_metrics(metrics.clone());
        }

        Self {
            config: settings.config,
            endpoint_override: None,
            manager: ConnectionManager::new(settings.strategy, settings.max_reconnect_attempts),
            dispatcher,
            events,
            status,
            commands,
            switch_delay: settings.endpoint_switch_delay,
            metrics: settings.metrics,
        }
    }

    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.connect().await,
                Phase::Backoff(delay) => self.backoff(delay).await,
                Phase::Stop => break,
            };
        }

        self.manager.shutting_down();
        self.publish_state();
        tracing::debug!("Connection worker exiting");
    }

    fn publish_state(&self) {
        let state = self.manager.state();
        self.status.publish(state);
        if let Some(metrics) = &self.metrics {
            metrics.update_connection_state(state);
        }
    }

    fn emit(&self, event: ClientEvent) {
        match &event {
            ClientEvent::ErrorOccurred(error) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(error);
                }
            }
            ClientEvent::ProviderDetected(info) => self.status.set_provider_info(info.clone()),
            _ => {}
        }
        self.events.emit(event);
    }

    fn current_endpoint(&self) -> Option<ConnectionEndpoint> {
        self.endpoint_override
            .clone()
            .or_else(|| self.config.endpoint())
    }

    /// Record a new endpoint, returning `true` if it differs from the current one
    fn replace_endpoint(&mut self, endpoint: ConnectionEndpoint) -> bool {
        if self.current_endpoint().as_ref() == Some(&endpoint) {
            tracing::debug!(url = %endpoint, "Endpoint unchanged");
            return false;
        }
        tracing::info!(url = %endpoint, "Endpoint updated");
        self.endpoint_override = Some(endpoint);
        true
    }

    fn reject_send(&self, request: &OutboundRequest) {
        tracing::warn!(
            request_id = %request.request_id,
            state = self.manager.state().as_str(),
            "Cannot send - not connected"
        );
        self.emit(ClientEvent::ErrorOccurred(Error::NotConnected));
    }

    fn switch_endpoint(&mut self) -> Phase {
        self.manager.schedule_switch(self.switch_delay);
        self.publish_state();
        Phase::Backoff(self.switch_delay)
    }

    async fn idle(&mut self) -> Phase {
        match self.commands.recv().await {
            None | Some(Command::Shutdown) => Phase::Stop,
            Some(Command::Connect) => {
                if self.manager.manual_connect() {
                    Phase::Connect
                } else {
                    Phase::Idle
                }
            }
            Some(Command::Disconnect) => {
                self.manager.disconnected();
                self.publish_state();
                Phase::Idle
            }
            Some(Command::UpdateEndpoint(endpoint)) => {
                if self.replace_endpoint(endpoint) {
                    self.switch_endpoint()
                } else {
                    Phase::Idle
                }
            }
            Some(Command::Send(request)) => {
                self.reject_send(&request);
                Phase::Idle
            }
        }
    }

    async fn backoff(&mut self, delay: Duration) -> Phase {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Phase::Connect,
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Phase::Stop,
                    Some(Command::Disconnect) => {
                        tracing::info!("Reconnection cancelled");
                        self.manager.disconnected();
                        self.publish_state();
                        return Phase::Idle;
                    }
                    Some(Command::Connect) => {
                        self.manager.manual_connect();
                        return Phase::Connect;
                    }
                    Some(Command::UpdateEndpoint(endpoint)) => {
                        if self.replace_endpoint(endpoint) {
                            return self.switch_endpoint();
                        }
                    }
                    Some(Command::Send(request)) => self.reject_send(&request),
                },
            }
        }
    }

    async fn connect(&mut self) -> Phase {
        let Some(endpoint) = self.current_endpoint() else {
            tracing::error!("No backend endpoint configured");
            self.manager.disconnected();
            self.publish_state();
            self.emit(ClientEvent::ErrorOccurred(Error::NoEndpoint));
            return Phase::Idle;
        };
        if let Err(error) = endpoint.validate() {
            tracing::error!(url = %endpoint, error = %error, "Invalid backend endpoint");
            self.manager.disconnected();
            self.publish_state();
            self.emit(ClientEvent::ErrorOccurred(error));
            return Phase::Idle;
        }

        let provider = self.dispatcher.profile().kind();
        let tuning = self.config.tuning_for(provider);
        let was_retry = self.manager.failures() > 0;

        self.manager.connecting();
        self.publish_state();

        let url = endpoint.url();
        tracing::info!(
            url = %url,
            provider = %provider,
            ping_interval_secs = tuning.ping_interval.as_secs(),
            ping_timeout_secs = tuning.ping_timeout.as_secs(),
            max_message_size = tuning.max_message_size,
            compression = tuning.compression,
            "Connecting to backend"
        );

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(tuning.max_message_size);
        ws_config.max_frame_size = Some(tuning.max_message_size);

        let handshake = tokio::time::timeout(
            tuning.connect_timeout,
            connect_async_with_config(url.clone(), Some(ws_config), false),
        );
        tokio::pin!(handshake);

        let result = loop {
            tokio::select! {
                result = &mut handshake => break result,
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Phase::Stop,
                    Some(Command::Disconnect) => {
                        tracing::info!("Handshake aborted by disconnect");
                        self.manager.disconnected();
                        self.publish_state();
                        return Phase::Idle;
                    }
                    Some(Command::Connect) => {
                        tracing::debug!("Already connecting");
                    }
                    Some(Command::UpdateEndpoint(endpoint)) => {
                        if self.replace_endpoint(endpoint) {
                            return self.switch_endpoint();
                        }
                    }
                    Some(Command::Send(request)) => self.reject_send(&request),
                },
            }
        };

        let ws = match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                return self.handshake_failed(Error::WebSocket(e.to_string()));
            }
            Err(_elapsed) => {
                return self.handshake_failed(Error::WebSocket(format!(
                    "handshake timed out after {:?}",
                    tuning.connect_timeout
                )));
            }
        };

        self.manager.connected();
        self.publish_state();
        tracing::info!(url = %url, "Connected to backend");
        if was_retry {
            if let Some(metrics) = &self.metrics {
                metrics.record_reconnection_success();
            }
        }
        self.emit(ClientEvent::ConnectivityChanged(true));

        let end = self.serve(ws, tuning.ping_interval, tuning.ping_timeout).await;
        self.dispatcher.reset_session();

        // Shared status must read "down" before the consumer sees the event
        match end {
            LinkEnd::Lost(error) => {
                tracing::warn!(error = %error, "Connection lost");
                let outcome = self.manager.failed();
                self.publish_state();
                self.emit(ClientEvent::ConnectivityChanged(false));
                self.emit(ClientEvent::ErrorOccurred(error));
                self.after_failure(outcome)
            }
            LinkEnd::Disconnected => {
                tracing::info!("Disconnected by request");
                self.manager.disconnected();
                self.publish_state();
                self.emit(ClientEvent::ConnectivityChanged(false));
                Phase::Idle
            }
            LinkEnd::Switched => {
                let phase = self.switch_endpoint();
                self.emit(ClientEvent::ConnectivityChanged(false));
                phase
            }
            LinkEnd::Shutdown => {
                self.manager.shutting_down();
                self.publish_state();
                self.emit(ClientEvent::ConnectivityChanged(false));
                Phase::Stop
            }
        }
    }

    fn handshake_failed(&mut self, error: Error) -> Phase {
        tracing::warn!(error = %error, "Connection attempt failed");
        let outcome = self.manager.failed();
        self.publish_state();
        self.emit(ClientEvent::ErrorOccurred(error));
        self.after_failure(outcome)
    }

    fn after_failure(&mut self, outcome: FailureOutcome) -> Phase {
        match outcome {
            FailureOutcome::Retry { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "Reconnecting"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_reconnection_attempt();
                }
                Phase::Backoff(delay)
            }
            FailureOutcome::GaveUp { failures } => {
                tracing::error!(attempts = failures, "Connection failed - max retries exceeded");
                self.emit(ClientEvent::ErrorOccurred(Error::MaxRetriesExceeded {
                    attempts: failures,
                }));
                Phase::Idle
            }
            FailureOutcome::Stopped => Phase::Idle,
        }
    }

    /// Run the read loop until the link ends
    async fn serve(
        &mut self,
        ws: WsStream,
        ping_interval: Duration,
        ping_timeout: Duration,
    ) -> LinkEnd {
        let (mut sink, mut stream) = ws.split();
        let mut keepalive = if ping_interval.is_zero() {
            tracing::info!("Keepalive disabled");
            None
        } else {
            let mut interval =
                tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            Some(interval)
        };
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let deadline = pong_deadline;
            tokio::select! {
                message = stream.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return LinkEnd::Lost(Error::WebSocket(e.to_string())),
                        None => return LinkEnd::Lost(Error::ConnectionClosed),
                    };
                    pong_deadline = None;

                    match message {
                        Message::Text(text) => {
                            if let Some(event) = self.dispatcher.handle_text(&text) {
                                self.emit(event);
                            }
                        }
                        Message::Close(frame) => {
                            tracing::info!(frame = ?frame, "Connection closed by backend");
                            return LinkEnd::Lost(Error::ConnectionClosed);
                        }
                        Message::Binary(data) => {
                            tracing::debug!(bytes = data.len(), "Ignoring binary message");
                        }
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(request)) => {
                        let text = match codec::encode_request(&request) {
                            Ok(text) => text,
                            Err(error) => {
                                tracing::error!(request_id = %request.request_id, error = %error, "Failed to encode request");
                                self.emit(ClientEvent::ErrorOccurred(error));
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            return LinkEnd::Lost(Error::WebSocket(e.to_string()));
                        }
                        tracing::debug!(
                            request_id = %request.request_id,
                            action = request.action().as_str(),
                            "Request sent"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_request(request.action().as_str());
                        }
                    }
                    Some(Command::Connect) => {
                        tracing::debug!("Already connected");
                    }
                    Some(Command::Disconnect) => {
                        let _ = sink.close().await;
                        return LinkEnd::Disconnected;
                    }
                    Some(Command::UpdateEndpoint(endpoint)) => {
                        if self.replace_endpoint(endpoint) {
                            let _ = sink.close().await;
                            return LinkEnd::Switched;
                        }
                    }
                    None | Some(Command::Shutdown) => {
                        let _ = sink.close().await;
                        return LinkEnd::Shutdown;
                    }
                },
                _ = async {
                    match keepalive.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        return LinkEnd::Lost(Error::WebSocket(e.to_string()));
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + ping_timeout);
                    }
                }
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    return LinkEnd::Lost(Error::WebSocket(format!(
                        "keepalive ping timed out after {:?}",
                        ping_timeout
                    )));
                }
            }
        }
    }
}
