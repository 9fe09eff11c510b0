//! Unified per-peer connection state
//!
//! A session reports two independent signals: the overall transport state
//! and the ICE connectivity sub-state. [`SignalPair`] remembers the latest
//! value of each and folds every new signal into a single [`Transition`]
//! for the orchestrator. Success from either source dominates failure.

use crate::session::{IceConnectionState, TransportState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection tracked
    Idle,
    /// Session created, waiting for connectivity
    Connecting,
    /// Transport or ICE reported success
    Connected,
    /// Recovering after a failure
    Reconnecting,
    /// Reconnect budget exhausted; only a manual reconnect revives it
    Failed,
    /// Explicitly closed
    Closed,
}

impl ConnectionState {
    /// All states, in declaration order
    pub const ALL: [ConnectionState; 6] = [
        ConnectionState::Idle,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Reconnecting,
        ConnectionState::Failed,
        ConnectionState::Closed,
    ];
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One lifecycle signal from a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// Overall transport state changed
    Transport(TransportState),
    /// ICE connectivity state changed
    Ice(IceConnectionState),
}

/// What the orchestrator must do in response to a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Enter `connected`: cancel timers, reset attempts, notify
    Connected,
    /// Route into the shared failure handler
    Failure,
    /// Nothing to do
    Ignore,
}

fn transport_success(state: TransportState) -> bool {
    matches!(state, TransportState::Connected)
}

fn transport_failure(state: TransportState) -> bool {
    matches!(state, TransportState::Disconnected | TransportState::Failed)
}

fn ice_success(state: IceConnectionState) -> bool {
    matches!(
        state,
        IceConnectionState::Connected | IceConnectionState::Completed
    )
}

fn ice_failure(state: IceConnectionState) -> bool {
    matches!(
        state,
        IceConnectionState::Disconnected | IceConnectionState::Failed
    )
}

/// Latest value reported by each signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalPair {
    /// Last transport state
    pub transport: TransportState,
    /// Last ICE connectivity state
    pub ice: IceConnectionState,
}

impl SignalPair {
    /// Record `signal` and decide the transition for a record in `current`
    ///
    /// Rules:
    /// - success from either source enters `connected` unless already there
    /// - failure is acted on only when the other source is not reporting
    ///   success, and never from `failed` or `closed`
    /// - every other value is informational
    pub fn apply(&mut self, current: ConnectionState, signal: SessionSignal) -> Transition {
        let (success, failure, other_success) = match signal {
            SessionSignal::Transport(state) => {
                self.transport = state;
                (
                    transport_success(state),
                    transport_failure(state),
                    ice_success(self.ice),
                )
            }
            SessionSignal::Ice(state) => {
                self.ice = state;
                (
                    ice_success(state),
                    ice_failure(state),
                    transport_success(self.transport),
                )
            }
        };

        if matches!(current, ConnectionState::Closed) {
            return Transition::Ignore;
        }

        if success {
            return if current == ConnectionState::Connected {
                Transition::Ignore
            } else {
                Transition::Connected
            };
        }

        if failure {
            if other_success || current == ConnectionState::Failed {
                return Transition::Ignore;
            }
            return Transition::Failure;
        }

        Transition::Ignore
    }

    /// Whether either source currently reports success
    pub fn any_success(&self) -> bool {
        transport_success(self.transport) || ice_success(self.ice)
    }
}
