//! Notifications emitted by the orchestrator
//!
//! All notifications flow through one broadcast channel as variants of a
//! single closed enum, so a subscriber that forgets a case gets a
//! non-exhaustive match warning instead of a silently missing callback.

use crate::peer::ConnectionState;
use crate::types::{IceCandidate, SessionDescription, TrackInfo};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// Event emitted for a single peer
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A new session was created for the peer
    Created {
        /// Peer identifier
        peer_id: String,
    },

    /// The unified connection state changed
    StateChanged {
        /// Peer identifier
        peer_id: String,
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },

    /// The peer reached `connected`
    Connected {
        /// Peer identifier
        peer_id: String,
    },

    /// The peer reached the terminal `failed` state
    Failed {
        /// Peer identifier
        peer_id: String,
        /// Last recorded failure cause
        error: Option<String>,
    },

    /// The connection was closed and its record removed
    Closed {
        /// Peer identifier
        peer_id: String,
    },

    /// A reconnect attempt was scheduled
    Reconnecting {
        /// Peer identifier
        peer_id: String,
        /// 1-based attempt number within the current failure episode
        attempt: u32,
        /// Configured attempt budget
        max_attempts: u32,
        /// Backoff delay before the attempt runs
        delay: Duration,
    },

    /// The peer connected again after a failure
    ///
    /// Not emitted when a manual reconnect of a healthy peer succeeds.
    Reconnected {
        /// Peer identifier
        peer_id: String,
        /// Attempts spent in the episode that just ended
        attempts: u32,
    },

    /// The reconnect budget is spent; no further automatic retries
    ReconnectExhausted {
        /// Peer identifier
        peer_id: String,
        /// Attempts spent
        attempts: u32,
    },

    /// A local candidate must be delivered to the remote peer
    IceCandidate {
        /// Peer identifier
        peer_id: String,
        /// Candidate to forward over signaling
        candidate: IceCandidate,
    },

    /// A remote media track arrived
    Track {
        /// Peer identifier
        peer_id: String,
        /// Track description
        track: TrackInfo,
    },

    /// The session needs a new offer/answer exchange
    ///
    /// `offer` is set when the orchestrator already produced the description
    /// (ICE restart); otherwise the application creates one itself.
    NegotiationNeeded {
        /// Peer identifier
        peer_id: String,
        /// Local description to send, if already created
        offer: Option<SessionDescription>,
    },
}

impl ConnectionEvent {
    /// Peer the event refers to
    pub fn peer_id(&self) -> &str {
        match self {
            ConnectionEvent::Created { peer_id }
            | ConnectionEvent::StateChanged { peer_id, .. }
            | ConnectionEvent::Connected { peer_id }
            | ConnectionEvent::Failed { peer_id, .. }
            | ConnectionEvent::Closed { peer_id }
            | ConnectionEvent::Reconnecting { peer_id, .. }
            | ConnectionEvent::Reconnected { peer_id, .. }
            | ConnectionEvent::ReconnectExhausted { peer_id, .. }
            | ConnectionEvent::IceCandidate { peer_id, .. }
            | ConnectionEvent::Track { peer_id, .. }
            | ConnectionEvent::NegotiationNeeded { peer_id, .. } => peer_id,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Created { .. } => "created",
            ConnectionEvent::StateChanged { .. } => "state_changed",
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::Failed { .. } => "failed",
            ConnectionEvent::Closed { .. } => "closed",
            ConnectionEvent::Reconnecting { .. } => "reconnecting",
            ConnectionEvent::Reconnected { .. } => "reconnected",
            ConnectionEvent::ReconnectExhausted { .. } => "reconnect_exhausted",
            ConnectionEvent::IceCandidate { .. } => "ice_candidate",
            ConnectionEvent::Track { .. } => "track",
            ConnectionEvent::NegotiationNeeded { .. } => "negotiation_needed",
        }
    }
}

/// Broadcast fan-out for connection events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody is subscribed
    pub fn emit(&self, event: ConnectionEvent) {
        trace!(peer_id = %event.peer_id(), event = event.name(), "emit");
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
