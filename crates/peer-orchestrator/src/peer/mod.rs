//! Peer connection management
//!
//! This module owns the per-peer lifecycle: the unified state machine,
//! the reconnection backoff policy, the remote candidate buffer and the
//! orchestrator that ties them together.

pub mod backoff;
pub mod candidates;
pub mod orchestrator;
pub mod record;
pub mod state;

pub use backoff::ReconnectionPolicy;
pub use candidates::{CandidateBuffer, CandidateDisposition};
pub use orchestrator::{ConnectOptions, ConnectionOrchestrator, OrchestratorBuilder};
pub use record::{ConnectionInfo, Metadata, SummaryStats};
pub use state::{ConnectionState, SessionSignal, SignalPair, Transition};
