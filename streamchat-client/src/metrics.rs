//! Client metrics
//!
//! OpenTelemetry instruments describing connection health and stream
//! throughput. They are recorded through the global meter provider, so they
//! are exported only after `streamchat_core::init_observability` installed
//! one; otherwise recording is a no-op.
//!
//! # Metrics Collected
//!
//! - **connection.state**: current state code (gauge)
//! - **frames.received**: decoded inbound frames by status (counter)
//! - **chunks.received**: text chunks (counter)
//! - **chunk.latency**: time between consecutive text chunks (histogram)
//! - **decode.errors**: frames rejected by the codec (counter)
//! - **errors**: errors surfaced to the consumer, by class (counter)
//! - **reconnection.attempts** / **reconnection.success** (counters)
//! - **requests.sent**: outbound requests by action (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};
use streamchat_core::Error;

use crate::connection_state::ConnectionState;

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// See [`ConnectionState::code`]
    pub connection_state: Gauge<i64>,
    pub frames_received: Counter<u64>,
    pub chunks_received: Counter<u64>,
    /// Seconds between consecutive text chunks of one response
    pub chunk_latency: Histogram<f64>,
    pub decode_errors: Counter<u64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
    pub requests_sent: Counter<u64>,
}

impl ClientMetrics {
    /// Instruments on a meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("streamchat.client.connection.state")
                .with_description(
                    "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnect_scheduled, 4=shutting_down)",
                )
                .build(),
            frames_received: meter
                .u64_counter("streamchat.client.frames.received")
                .with_description("Inbound frames decoded, by status")
                .build(),
            chunks_received: meter
                .u64_counter("streamchat.client.chunks.received")
                .with_description("Text chunks delivered to the consumer")
                .build(),
            chunk_latency: meter
                .f64_histogram("streamchat.client.chunk.latency")
                .with_description("Seconds between consecutive text chunks")
                .with_unit("s")
                .build(),
            decode_errors: meter
                .u64_counter("streamchat.client.decode.errors")
                .with_description("Inbound frames rejected by the codec")
                .build(),
            errors_total: meter
                .u64_counter("streamchat.client.errors.total")
                .with_description("Errors surfaced to the consumer, by class")
                .build(),
            reconnection_attempts: meter
                .u64_counter("streamchat.client.reconnection.attempts")
                .with_description("Scheduled reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("streamchat.client.reconnection.success")
                .with_description("Handshakes that succeeded after a failure")
                .build(),
            requests_sent: meter
                .u64_counter("streamchat.client.requests.sent")
                .with_description("Outbound requests written to the socket, by action")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(
            i64::from(state.code()),
            &[KeyValue::new("state", state.as_str())],
        );
    }

    pub fn record_frame(&self, status: &'static str) {
        self.frames_received.add(1, &[KeyValue::new("status", status)]);
    }

    /// A text chunk, with the gap since the previous one if known
    pub fn record_chunk(&self, latency_secs: Option<f64>) {
        self.chunks_received.add(1, &[]);
        if let Some(latency) = latency_secs {
            self.chunk_latency.record(latency, &[]);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.add(1, &[]);
    }

    pub fn record_error(&self, error: &Error) {
        self.errors_total
            .add(1, &[KeyValue::new("class", error.class().as_str())]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    pub fn record_request(&self, action: &'static str) {
        self.requests_sent.add(1, &[KeyValue::new("action", action)]);
    }
}
