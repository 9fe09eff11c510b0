//! Orchestrator test harness
//!
//! Provides a scriptable in-memory session so integration tests can drive
//! the orchestrator without a network:
//!
//! 1. Build an orchestrator with `harness::orchestrator(config)`
//! 2. Fetch the session the factory handed out with `factory.session(peer)`
//! 3. Push lifecycle signals through `MockSession::signal_*`
//! 4. Advance virtual time with `harness::advance`
//! 5. Drain notifications with `harness::drain`

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use peer_orchestrator::{
    ConnectionEvent, ConnectionOrchestrator, ConnectionStats, Error, IceCandidate,
    IceConnectionState, OrchestratorConfig, PeerSession, Result, SessionConfig,
    SessionDescription, SessionFactory, SessionObserver, TrackInfo, TransportState,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Scriptable stand-in for a platform peer connection
pub struct MockSession {
    peer_id: String,
    observer: SessionObserver,
    config: SessionConfig,
    transport: Mutex<TransportState>,
    ice: Mutex<IceConnectionState>,
    remote_description: AtomicBool,
    applied: Mutex<Vec<IceCandidate>>,
    fail_restart: AtomicBool,
    restart_gate: Mutex<Option<Arc<Notify>>>,
    restart_calls: AtomicU32,
    close_calls: AtomicU32,
    stats: Mutex<ConnectionStats>,
}

impl MockSession {
    fn new(peer_id: &str, config: SessionConfig, observer: SessionObserver) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            observer,
            config,
            transport: Mutex::new(TransportState::New),
            ice: Mutex::new(IceConnectionState::New),
            remote_description: AtomicBool::new(false),
            applied: Mutex::new(Vec::new()),
            fail_restart: AtomicBool::new(false),
            restart_gate: Mutex::new(None),
            restart_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    /// Report a transport state change to the orchestrator
    pub fn signal_transport(&self, state: TransportState) {
        *self.transport.lock() = state;
        self.observer.on_connection_state_change(state);
    }

    /// Report an ICE state change to the orchestrator
    pub fn signal_ice(&self, state: IceConnectionState) {
        *self.ice.lock() = state;
        self.observer.on_ice_connection_state_change(state);
    }

    /// Report both sources as connected
    pub fn connect(&self) {
        self.signal_ice(IceConnectionState::Connected);
        self.signal_transport(TransportState::Connected);
    }

    /// Report both sources as failed
    pub fn fail(&self) {
        self.signal_ice(IceConnectionState::Failed);
        self.signal_transport(TransportState::Failed);
    }

    /// Gather a local candidate
    pub fn gather(&self, candidate: &str) {
        self.observer.on_ice_candidate(IceCandidate::new(candidate));
    }

    /// Deliver a remote track
    pub fn receive_track(&self, track_id: &str) {
        self.observer.on_track(TrackInfo {
            track_id: track_id.to_string(),
            stream_id: "stream-0".to_string(),
            kind: "audio".to_string(),
            ssrc: 1234,
        });
    }

    /// Ask for renegotiation
    pub fn need_negotiation(&self) {
        self.observer.on_negotiation_needed();
    }

    /// Mark the remote description as applied without going through the orchestrator
    pub fn mark_remote_description(&self) {
        self.remote_description.store(true, Ordering::SeqCst);
    }

    /// Make every following `restart_ice` fail (or succeed again)
    pub fn set_restart_failure(&self, fail: bool) {
        self.fail_restart.store(fail, Ordering::SeqCst);
    }

    /// Park every following `restart_ice` until the returned gate is notified
    pub fn hold_restarts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.restart_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Replace the reported statistics
    pub fn set_stats(&self, stats: ConnectionStats) {
        *self.stats.lock() = stats;
    }

    /// Candidate strings applied so far, in order
    pub fn applied_candidates(&self) -> Vec<String> {
        self.applied
            .lock()
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn restart_calls(&self) -> u32 {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn epoch(&self) -> u64 {
        self.observer.epoch()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl PeerSession for MockSession {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn connection_state(&self) -> TransportState {
        *self.transport.lock()
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        *self.ice.lock()
    }

    async fn has_remote_description(&self) -> bool {
        self.remote_description.load(Ordering::SeqCst)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(format!("v=0 offer {}", self.peer_id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if !self.remote_description.load(Ordering::SeqCst) {
            return Err(Error::SdpError("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer(format!("v=0 answer {}", self.peer_id)))
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> Result<()> {
        self.remote_description.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if !self.remote_description.load(Ordering::SeqCst) {
            return Err(Error::IceCandidateError(
                "remote description not set".to_string(),
            ));
        }
        self.applied.lock().push(candidate);
        Ok(())
    }

    async fn restart_ice(&self) -> Result<Option<SessionDescription>> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.restart_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(Error::NegotiationError("ICE restart rejected".to_string()));
        }
        Ok(Some(SessionDescription::offer(format!(
            "v=0 restart {}",
            self.peer_id
        ))))
    }

    async fn connection_stats(&self) -> Result<ConnectionStats> {
        Ok(self.stats.lock().clone())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.transport.lock() = TransportState::Closed;
        Ok(())
    }
}

/// Factory that records every session it creates
#[derive(Default)]
pub struct MockSessionFactory {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    fail_next: AtomicBool,
    fail_restarts: AtomicBool,
}

impl MockSessionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Latest session created for `peer_id`
    pub fn session(&self, peer_id: &str) -> Arc<MockSession> {
        self.sessions
            .lock()
            .iter()
            .rev()
            .find(|s| s.peer_id == peer_id)
            .cloned()
            .unwrap_or_else(|| panic!("no session created for {}", peer_id))
    }

    /// Every session created for `peer_id`, oldest first
    pub fn sessions_for(&self, peer_id: &str) -> Vec<Arc<MockSession>> {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.peer_id == peer_id)
            .cloned()
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Make the next `create` call fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Sessions created from now on reject `restart_ice`
    pub fn fail_restarts(&self, fail: bool) {
        self.fail_restarts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: SessionConfig,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::WebRtcError("factory failure".to_string()));
        }

        let session = Arc::new(MockSession::new(peer_id, config, observer));
        session.set_restart_failure(self.fail_restarts.load(Ordering::SeqCst));
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session as Arc<dyn PeerSession>)
    }
}

/// Orchestrator wired to a fresh mock factory
pub fn orchestrator(config: OrchestratorConfig) -> (ConnectionOrchestrator, Arc<MockSessionFactory>) {
    init_logging();
    let factory = MockSessionFactory::new();
    let orchestrator = ConnectionOrchestrator::new(config, factory.clone())
        .expect("valid test configuration");
    (orchestrator, factory)
}

/// Configuration with short, distinct delays for virtual-time tests
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 100,
        max_reconnect_delay_ms: 30_000,
        backoff_multiplier: 2.0,
        connection_timeout_ms: 5_000,
        ..Default::default()
    }
}

/// Let spawned timer tasks run to completion
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, then let woken tasks run
pub async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

/// Every event currently queued on `rx`
pub fn drain(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Names of the events, for compact assertions
pub fn names(events: &[ConnectionEvent]) -> Vec<&'static str> {
    events.iter().map(ConnectionEvent::name).collect()
}

/// How many events named `name`
pub fn count(events: &[ConnectionEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}
