//! Multi-peer WebRTC connection orchestration
//!
//! This crate keeps a set of peer sessions connected: it tracks one session
//! per remote peer, folds transport and ICE state callbacks into a single
//! connection state, retries failed connections with exponential backoff,
//! and buffers remote ICE candidates that arrive before the remote
//! description.
//!
//! # Features
//!
//! - **Unified state machine**: transport and ICE signals reduced to one
//!   `ConnectionState` per peer, success dominating failure
//! - **Bounded reconnection**: exponential backoff with a per-episode
//!   attempt budget, plus manual reconnect
//! - **Connection timeouts** feeding the same retry path
//! - **Candidate buffering**: early remote candidates applied in arrival order
//! - **Event stream**: one broadcast channel of `ConnectionEvent`s
//! - **webrtc-rs sessions** out of the box, or any `SessionFactory`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Application + signaling transport                   │
//! │  ↑ ConnectionEvent (broadcast)   ↓ candidates / SDP  │
//! │  ConnectionOrchestrator                              │
//! │  ├─ Registry (records, reconnect + timeout timers)   │
//! │  ├─ CandidateBuffer (per-peer FIFO)                  │
//! │  └─ Scheduler (tokio time, injectable)               │
//! │     ↓ SessionFactory / SessionObserver               │
//! │  PeerSession (RtcSession on webrtc-rs)               │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use peer_orchestrator::OrchestratorConfig;
//!
//! let config = OrchestratorConfig {
//!     max_reconnect_attempts: 3,
//!     reconnect_delay_ms: 500,
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use peer_orchestrator::{
//!     ConnectOptions, ConnectionEvent, ConnectionOrchestrator, OrchestratorConfig,
//!     RtcSessionFactory,
//! };
//!
//! # async fn example() -> peer_orchestrator::Result<()> {
//! let orchestrator = ConnectionOrchestrator::new(
//!     OrchestratorConfig::default(),
//!     Arc::new(RtcSessionFactory::new()),
//! )?;
//! let mut events = orchestrator.subscribe();
//!
//! orchestrator
//!     .create_connection("peer-abc123", ConnectOptions::default())
//!     .await?;
//! let offer = orchestrator.create_offer("peer-abc123").await?;
//! // send `offer` over signaling ...
//!
//! while let Ok(event) = events.recv().await {
//!     if let ConnectionEvent::IceCandidate { peer_id, candidate } = event {
//!         // forward `candidate` to `peer_id` ...
//!         # let _ = (peer_id, candidate, &offer);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod peer;
pub mod scheduler;
pub mod session;
pub mod types;

pub use config::{IceServer, IceTransportPolicy, OrchestratorConfig, SessionOptions};
pub use error::{Error, Result};
pub use events::{ConnectionEvent, EventBus};
pub use peer::{
    CandidateBuffer, CandidateDisposition, ConnectOptions, ConnectionInfo,
    ConnectionOrchestrator, ConnectionState, Metadata, OrchestratorBuilder, ReconnectionPolicy,
    SummaryStats,
};
pub use scheduler::{Scheduler, TimerHandle, TokioScheduler};
pub use session::{
    IceConnectionState, IceServerSource, PeerSession, RtcSession, RtcSessionFactory,
    SessionConfig, SessionFactory, SessionObserver, StaticIceServers, TransportState,
};
pub use types::{ConnectionStats, IceCandidate, SdpType, SessionDescription, TrackInfo};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
