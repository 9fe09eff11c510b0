//! Session wrapper contract
//!
//! A [`PeerSession`] wraps one platform peer connection. The orchestrator
//! never touches the WebRTC library directly; it builds sessions through a
//! [`SessionFactory`] and receives their lifecycle callbacks through the
//! [`SessionObserver`] handed to the factory.

pub mod rtc;

pub use rtc::{RtcSession, RtcSessionFactory};

use crate::config::{IceServer, SessionOptions};
use crate::types::{ConnectionStats, IceCandidate, SessionDescription, TrackInfo};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Overall transport state reported by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Not started
    #[default]
    New,
    /// Transports are being established
    Connecting,
    /// All transports are usable
    Connected,
    /// At least one transport lost connectivity
    Disconnected,
    /// At least one transport failed
    Failed,
    /// Session closed
    Closed,
}

/// ICE connectivity sub-state reported by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    /// Gathering or waiting for remote candidates
    #[default]
    New,
    /// Checking candidate pairs
    Checking,
    /// A usable pair was found
    Connected,
    /// Checking finished with a usable pair
    Completed,
    /// Connectivity lost, may recover
    Disconnected,
    /// No usable pair
    Failed,
    /// Agent shut down
    Closed,
}

/// Everything a factory needs to build one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// STUN/TURN servers for this session
    pub ice_servers: Vec<IceServer>,
    /// Passthrough options
    pub options: SessionOptions,
}

/// One platform peer connection
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Remote peer this session talks to
    fn peer_id(&self) -> &str;

    /// Current transport state
    fn connection_state(&self) -> TransportState;

    /// Current ICE connectivity state
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Whether a remote description has been applied
    async fn has_remote_description(&self) -> bool;

    /// Create and apply a local offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create and apply a local answer to the applied remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a remote offer or answer
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Apply one remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Restart ICE; returns the renegotiation offer if one was produced
    async fn restart_ice(&self) -> Result<Option<SessionDescription>>;

    /// Transport statistics
    async fn connection_stats(&self) -> Result<ConnectionStats>;

    /// Close the underlying connection
    async fn close(&self) -> Result<()>;
}

/// Builds sessions for the orchestrator
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Create a session for `peer_id`, wiring its callbacks to `observer`
    async fn create(
        &self,
        peer_id: &str,
        config: SessionConfig,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>>;
}

/// Supplies the current STUN/TURN list, consulted once per session creation
pub trait IceServerSource: Send + Sync {
    /// Current server list
    fn ice_servers(&self) -> Vec<IceServer>;
}

/// Fixed server list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticIceServers(pub Vec<IceServer>);

impl IceServerSource for StaticIceServers {
    fn ice_servers(&self) -> Vec<IceServer> {
        self.0.clone()
    }
}

impl<F> IceServerSource for F
where
    F: Fn() -> Vec<IceServer> + Send + Sync,
{
    fn ice_servers(&self) -> Vec<IceServer> {
        self()
    }
}

/// Lifecycle callback raised by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport state changed
    ConnectionStateChange(TransportState),
    /// ICE connectivity state changed
    IceConnectionStateChange(IceConnectionState),
    /// Local candidate gathered
    IceCandidate(IceCandidate),
    /// Remote track received
    Track(TrackInfo),
    /// Renegotiation required
    NegotiationNeeded,
}

/// Receiver side of session callbacks, implemented by the orchestrator
pub(crate) trait SessionEventSink: Send + Sync {
    fn deliver(&self, peer_id: &str, epoch: u64, event: SessionEvent);
}

/// Callback handle given to a session at creation time
///
/// Holds only a weak reference to the orchestrator, so a session that
/// outlives it reports into the void instead of keeping it alive. Each
/// observer is tagged with the epoch of the session it was created for;
/// callbacks from a replaced session are discarded by the orchestrator.
#[derive(Clone)]
pub struct SessionObserver {
    sink: Weak<dyn SessionEventSink>,
    peer_id: Arc<str>,
    epoch: u64,
}

impl SessionObserver {
    pub(crate) fn new(sink: Weak<dyn SessionEventSink>, peer_id: &str, epoch: u64) -> Self {
        Self {
            sink,
            peer_id: Arc::from(peer_id),
            epoch,
        }
    }

    /// Peer the observed session belongs to
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Session epoch this observer reports for
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn deliver(&self, event: SessionEvent) {
        if let Some(sink) = self.sink.upgrade() {
            sink.deliver(&self.peer_id, self.epoch, event);
        }
    }

    /// Report a transport state change
    pub fn on_connection_state_change(&self, state: TransportState) {
        self.deliver(SessionEvent::ConnectionStateChange(state));
    }

    /// Report an ICE connectivity state change
    pub fn on_ice_connection_state_change(&self, state: IceConnectionState) {
        self.deliver(SessionEvent::IceConnectionStateChange(state));
    }

    /// Report a gathered local candidate
    pub fn on_ice_candidate(&self, candidate: IceCandidate) {
        self.deliver(SessionEvent::IceCandidate(candidate));
    }

    /// Report a remote track
    pub fn on_track(&self, track: TrackInfo) {
        self.deliver(SessionEvent::Track(track));
    }

    /// Report that renegotiation is needed
    pub fn on_negotiation_needed(&self) {
        self.deliver(SessionEvent::NegotiationNeeded);
    }
}

impl std::fmt::Debug for SessionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionObserver")
            .field("peer_id", &self.peer_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}
