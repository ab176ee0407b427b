//! Connection state management
//!
//! Tracks the lifecycle of the single connection to the chat backend and
//! counts consecutive failures for the reconnection ceiling.
//!
//! # Connection States
//!
//! - **Disconnected**: not connected, no retry pending
//! - **Connecting**: handshake in progress
//! - **Connected**: handshake done, read loop running
//! - **ReconnectScheduled**: connection lost, waiting out a backoff delay
//! - **ShuttingDown**: the worker is stopping for good
//!
//! # State Transitions
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                       │  ▲                │
//!      │ give up / disconnect  │  │ delay elapsed  │ lost
//!      └──────────────── ReconnectScheduled ◀──────┘
//! ```
//!
//! The manager is owned by the connection worker and mutated only there.
//! Other threads observe the state through [`SharedStatus`].

use crate::provider::ProviderInfo;
use crate::reconnect::{ReconnectionStrategy, RetryDecision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before retry number `attempt` (0-indexed)
    ReconnectScheduled { attempt: u32, delay: Duration },
    ShuttingDown,
}

impl ConnectionState {
    /// Numeric code reported by the state gauge
    pub fn code(&self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::ReconnectScheduled { .. } => 3,
            ConnectionState::ShuttingDown => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectScheduled { .. } => "reconnect_scheduled",
            ConnectionState::ShuttingDown => "shutting_down",
        }
    }
}

/// What the worker should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Wait and try again
    Retry { attempt: u32, delay: Duration },
    /// Ceiling reached after this many consecutive failures
    GaveUp { failures: u32 },
    /// The user asked to disconnect; stay down quietly
    Stopped,
}

/// Owns the connection state and the reconnection counter
pub struct ConnectionManager {
    state: ConnectionState,
    failures: u32,
    ceiling: u32,
    should_reconnect: bool,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl ConnectionManager {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, ceiling: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            failures: 0,
            ceiling,
            should_reconnect: false,
            strategy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last success or manual connect
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A user-initiated connect; clears the failure counter
    ///
    /// Returns `false` when a connection is already up or being set up.
    pub fn manual_connect(&mut self) -> bool {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::ShuttingDown
        ) {
            return false;
        }
        self.should_reconnect = true;
        self.failures = 0;
        self.strategy.reset();
        true
    }

    /// Handshake starting
    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Handshake succeeded
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.strategy.reset();
    }

    /// A handshake failed or an established connection was lost
    pub fn failed(&mut self) -> FailureOutcome {
        if !self.should_reconnect {
            self.state = ConnectionState::Disconnected;
            return FailureOutcome::Stopped;
        }

        self.failures = self.failures.saturating_add(1);
        match RetryDecision::with_strategy(self.failures, self.ceiling, self.strategy.as_mut()) {
            RetryDecision::Retry { attempt, delay } => {
                self.state = ConnectionState::ReconnectScheduled { attempt, delay };
                FailureOutcome::Retry { attempt, delay }
            }
            RetryDecision::GiveUp => {
                self.state = ConnectionState::Disconnected;
                self.should_reconnect = false;
                FailureOutcome::GaveUp {
                    failures: self.failures,
                }
            }
        }
    }

    /// Schedule a reconnect after `delay` without counting a failure
    ///
    /// Used when the endpoint changes: the old link is closed on purpose and
    /// the new one should start with a fresh counter.
    pub fn schedule_switch(&mut self, delay: Duration) {
        self.should_reconnect = true;
        self.failures = 0;
        self.strategy.reset();
        self.state = ConnectionState::ReconnectScheduled { attempt: 0, delay };
    }

    /// User-requested disconnect; suppresses automatic reconnection
    pub fn disconnected(&mut self) {
        self.should_reconnect = false;
        self.state = ConnectionState::Disconnected;
    }

    pub fn shutting_down(&mut self) {
        self.should_reconnect = false;
        self.state = ConnectionState::ShuttingDown;
    }
}

/// Read-mostly flags shared between the worker and the client handle
#[derive(Debug)]
pub struct SharedStatus {
    connected: AtomicBool,
    state: RwLock<ConnectionState>,
    provider: RwLock<ProviderInfo>,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(false),
            state: RwLock::new(ConnectionState::Disconnected),
            provider: RwLock::new(ProviderInfo::default()),
        }
    }
}

impl SharedStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Last state published by the worker
    pub fn state(&self) -> ConnectionState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn publish(&self, state: ConnectionState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
        self.connected
            .store(state == ConnectionState::Connected, Ordering::Release);
    }

    pub fn provider_info(&self) -> ProviderInfo {
        match self.provider.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_provider_info(&self, info: ProviderInfo) {
        match self.provider.write() {
            Ok(mut guard) => *guard = info,
            Err(poisoned) => *poisoned.into_inner() = info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::{ExponentialBackoff, FixedDelay};

    fn manager(ceiling: u32) -> ConnectionManager {
        ConnectionManager::new(Box::new(ExponentialBackoff::default()), ceiling)
    }

    #[test]
    fn test_connection_state_transitions() {
        let mut manager = manager(5);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert!(manager.manual_connect());
        manager.connecting();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.connected();
        assert!(manager.is_connected());

        manager.disconnected();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.should_reconnect());
    }

    #[test]
    fn test_manual_connect_is_idempotent_while_up() {
        let mut manager = manager(5);
        assert!(manager.manual_connect());
        manager.connecting();
        assert!(!manager.manual_connect());
        manager.connected();
        assert!(!manager.manual_connect());
    }

    #[test]
    fn test_five_failures_hit_ceiling() {
        let mut manager = manager(5);
        manager.manual_connect();

        let mut delays = Vec::new();
        let outcome = loop {
            manager.connecting();
            match manager.failed() {
                FailureOutcome::Retry { delay, .. } => delays.push(delay.as_secs()),
                other => break other,
            }
        };

        assert_eq!(delays, vec![1, 2, 4, 8]);
        assert_eq!(outcome, FailureOutcome::GaveUp { failures: 5 });
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.should_reconnect());
    }

    #[test]
    fn test_success_resets_counter() {
        let mut manager = manager(5);
        manager.manual_connect();
        manager.failed();
        manager.failed();
        assert_eq!(manager.failures(), 2);

        manager.connected();
        assert_eq!(manager.failures(), 0);
        assert_eq!(
            manager.failed(),
            FailureOutcome::Retry {
                attempt: 0,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_manual_connect_after_give_up_resets_counter() {
        let mut manager = ConnectionManager::new(Box::new(FixedDelay::new(Duration::ZERO)), 2);
        manager.manual_connect();
        manager.failed();
        assert!(matches!(manager.failed(), FailureOutcome::GaveUp { failures: 2 }));

        assert!(manager.manual_connect());
        assert_eq!(manager.failures(), 0);
        assert!(matches!(manager.failed(), FailureOutcome::Retry { attempt: 0, .. }));
    }

    #[test]
    fn test_failure_after_disconnect_is_quiet() {
        let mut manager = manager(5);
        manager.manual_connect();
        manager.connected();
        manager.disconnected();
        assert_eq!(manager.failed(), FailureOutcome::Stopped);
        assert_eq!(manager.failures(), 0);
    }

    #[test]
    fn test_endpoint_switch_schedules_without_failure() {
        let mut manager = manager(5);
        manager.manual_connect();
        manager.failed();
        manager.schedule_switch(Duration::from_secs(1));
        assert_eq!(manager.failures(), 0);
        assert_eq!(
            manager.state(),
            ConnectionState::ReconnectScheduled {
                attempt: 0,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_shared_status_publish() {
        let status = SharedStatus::default();
        assert!(!status.is_connected());
        assert_eq!(status.state(), ConnectionState::Disconnected);

        status.publish(ConnectionState::Connected);
        assert!(status.is_connected());
        assert_eq!(status.state(), ConnectionState::Connected);

        status.publish(ConnectionState::ReconnectScheduled {
            attempt: 2,
            delay: Duration::from_secs(4),
        });
        assert!(!status.is_connected());
        assert_eq!(
            status.state(),
            ConnectionState::ReconnectScheduled {
                attempt: 2,
                delay: Duration::from_secs(4)
            }
        );
    }
}
