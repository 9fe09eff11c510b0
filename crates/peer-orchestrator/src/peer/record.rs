//! Per-peer bookkeeping

use super::state::{ConnectionState, SignalPair};
use crate::session::PeerSession;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque application data attached to a connection
pub type Metadata = HashMap<String, serde_json::Value>;

/// Mutable state for one tracked peer, owned by the orchestrator
pub(crate) struct ConnectionRecord {
    pub(crate) peer_id: String,
    pub(crate) session: Arc<dyn PeerSession>,
    /// Identifies the session generation; callbacks from older epochs are stale
    pub(crate) epoch: u64,
    pub(crate) state: ConnectionState,
    pub(crate) signals: SignalPair,
    pub(crate) created_at: Instant,
    pub(crate) connected_at: Option<Instant>,
    pub(crate) reconnect_attempts: u32,
    /// A failure has been handled since the peer was last connected
    pub(crate) recovering: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) metadata: Metadata,
}

impl ConnectionRecord {
    pub(crate) fn new(
        peer_id: &str,
        session: Arc<dyn PeerSession>,
        epoch: u64,
        created_at: Instant,
        metadata: Metadata,
    ) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            session,
            epoch,
            state: ConnectionState::Idle,
            signals: SignalPair::default(),
            created_at,
            connected_at: None,
            reconnect_attempts: 0,
            recovering: false,
            last_error: None,
            metadata,
        }
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            peer_id: self.peer_id.clone(),
            state: self.state,
            created_at: self.created_at,
            connected_at: self.connected_at,
            reconnect_attempts: self.reconnect_attempts,
            last_error: self.last_error.clone(),
            metadata: self.metadata.clone(),
            signals: self.signals,
        }
    }
}

/// Snapshot of a tracked connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote peer identifier
    pub peer_id: String,
    /// Unified connection state
    pub state: ConnectionState,
    /// When the session was created
    pub created_at: Instant,
    /// When the peer last reached `connected`
    pub connected_at: Option<Instant>,
    /// Attempts spent in the current failure episode
    pub reconnect_attempts: u32,
    /// Most recent failure cause
    pub last_error: Option<String>,
    /// Application data supplied at creation
    pub metadata: Metadata,
    /// Latest transport and ICE states reported by the session
    pub signals: SignalPair,
}

impl ConnectionInfo {
    /// Time since the peer last connected, if it is connected
    pub fn connected_for(&self) -> Option<Duration> {
        match (self.state, self.connected_at) {
            (ConnectionState::Connected, Some(at)) => Some(at.elapsed()),
            _ => None,
        }
    }
}

/// Connection counts partitioned by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    /// Tracked connections
    pub total: usize,
    /// Created but not yet started
    pub idle: usize,
    /// Waiting for the first successful signal
    pub connecting: usize,
    /// Transport or ICE reports success
    pub connected: usize,
    /// Inside a backoff episode
    pub reconnecting: usize,
    /// Out of attempts, waiting for a manual reconnect
    pub failed: usize,
    /// Closed but not yet removed
    pub closed: usize,
}

impl SummaryStats {
    pub(crate) fn record(&mut self, state: ConnectionState) {
        self.total += 1;
        match state {
            ConnectionState::Idle => self.idle += 1,
            ConnectionState::Connecting => self.connecting += 1,
            ConnectionState::Connected => self.connected += 1,
            ConnectionState::Reconnecting => self.reconnecting += 1,
            ConnectionState::Failed => self.failed += 1,
            ConnectionState::Closed => self.closed += 1,
        }
    }

    /// Count for one state
    pub fn count(&self, state: ConnectionState) -> usize {
        match state {
            ConnectionState::Idle => self.idle,
            ConnectionState::Connecting => self.connecting,
            ConnectionState::Connected => self.connected,
            ConnectionState::Reconnecting => self.reconnecting,
            ConnectionState::Failed => self.failed,
            ConnectionState::Closed => self.closed,
        }
    }
}
