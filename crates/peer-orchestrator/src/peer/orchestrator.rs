//! Connection orchestrator
//!
//! Owns every tracked peer session, folds session callbacks into the
//! unified [`ConnectionState`] machine, and drives connection timeouts and
//! exponential-backoff reconnection.
//!
//! All bookkeeping lives behind one `parking_lot` mutex that is never held
//! across an `.await`: session calls (`restart_ice`, `close`, offer/answer)
//! happen on a cloned `Arc` after the lock is released, and the results are
//! applied under a fresh lock. Events are emitted while the lock is held so
//! that notifications for a peer go out in the order their mutations happened.

use super::backoff::ReconnectionPolicy;
use super::candidates::{CandidateBuffer, CandidateDisposition};
use super::record::{ConnectionInfo, ConnectionRecord, Metadata, SummaryStats};
use super::state::{ConnectionState, SessionSignal, SignalPair, Transition};
use crate::config::{IceServer, OrchestratorConfig, SessionOptions};
use crate::events::{ConnectionEvent, EventBus};
use crate::scheduler::{Scheduler, TimerHandle, TokioScheduler};
use crate::session::{
    IceServerSource, PeerSession, SessionConfig, SessionEvent, SessionEventSink, SessionFactory,
    SessionObserver, StaticIceServers,
};
use crate::types::{ConnectionStats, IceCandidate, SessionDescription};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Per-call options for [`ConnectionOrchestrator::create_connection`]
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Opaque application data stored on the record
    pub metadata: Metadata,
    /// Extra STUN/TURN servers appended to the configured list
    pub ice_servers: Vec<IceServer>,
    /// Overrides the configured session passthrough options
    pub session: Option<SessionOptions>,
}

impl ConnectOptions {
    /// Attach one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Add per-call ICE servers
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers.extend(servers);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Reconnect,
    Timeout,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<String, ConnectionRecord>,
    reconnect_timers: HashMap<String, TimerHandle>,
    timeout_timers: HashMap<String, TimerHandle>,
}

impl Registry {
    fn timers(&mut self, kind: TimerKind) -> &mut HashMap<String, TimerHandle> {
        match kind {
            TimerKind::Reconnect => &mut self.reconnect_timers,
            TimerKind::Timeout => &mut self.timeout_timers,
        }
    }

    fn cancel_timer(&mut self, kind: TimerKind, peer_id: &str) {
        if let Some(handle) = self.timers(kind).remove(peer_id) {
            debug!("Cancelled {:?} timer for peer {}", kind, peer_id);
            handle.cancel();
        }
    }

    fn cancel_all_timers(&mut self) {
        for (_, handle) in self.reconnect_timers.drain() {
            handle.cancel();
        }
        for (_, handle) in self.timeout_timers.drain() {
            handle.cancel();
        }
    }
}

struct Inner {
    config: OrchestratorConfig,
    policy: ReconnectionPolicy,
    factory: Arc<dyn SessionFactory>,
    ice_servers: Arc<dyn IceServerSource>,
    scheduler: Arc<dyn Scheduler>,
    candidates: CandidateBuffer,
    registry: Mutex<Registry>,
    events: EventBus,
    next_epoch: AtomicU64,
    this: Weak<Inner>,
}

/// Builder for [`ConnectionOrchestrator`]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    factory: Arc<dyn SessionFactory>,
    ice_servers: Option<Arc<dyn IceServerSource>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl OrchestratorBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Consult `source` for STUN/TURN servers on every session creation
    ///
    /// Without a source, the servers listed in the config are used.
    pub fn ice_server_source(mut self, source: Arc<dyn IceServerSource>) -> Self {
        self.ice_servers = Some(source);
        self
    }

    /// Arm timers on `scheduler` instead of the tokio runtime
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Validate the configuration and build the orchestrator
    pub fn build(self) -> Result<ConnectionOrchestrator> {
        self.config.validate()?;

        let ice_servers: Arc<dyn IceServerSource> = match self.ice_servers {
            Some(source) => source,
            None => Arc::new(StaticIceServers(self.config.ice_servers.clone())),
        };
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler),
        };
        let policy = ReconnectionPolicy::from(&self.config);
        let events = EventBus::new(self.config.event_capacity);
        let config = self.config;
        let factory = self.factory;

        info!(
            "Creating connection orchestrator (max_reconnect_attempts={}, connection_timeout={}ms)",
            config.max_reconnect_attempts, config.connection_timeout_ms
        );

        let inner = Arc::new_cyclic(|this| Inner {
            config,
            policy,
            factory,
            ice_servers,
            scheduler,
            candidates: CandidateBuffer::new(),
            registry: Mutex::new(Registry::default()),
            events,
            next_epoch: AtomicU64::new(1),
            this: this.clone(),
        });

        Ok(ConnectionOrchestrator { inner })
    }
}

/// Tracks peer sessions and keeps each one connected
///
/// Cloning is cheap; all clones share the same peers.
#[derive(Clone)]
pub struct ConnectionOrchestrator {
    inner: Arc<Inner>,
}

impl ConnectionOrchestrator {
    /// Create an orchestrator with `config`, building sessions through `factory`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration is invalid.
    pub fn new(config: OrchestratorConfig, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        Self::builder(factory).config(config).build()
    }

    /// Start a builder with default configuration
    pub fn builder(factory: Arc<dyn SessionFactory>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: OrchestratorConfig::default(),
            factory,
            ice_servers: None,
            scheduler: None,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Backoff policy derived from the configuration
    pub fn policy(&self) -> &ReconnectionPolicy {
        &self.inner.policy
    }

    /// Subscribe to connection events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Create a session for `peer_id`, replacing any existing one
    ///
    /// The new record starts in `connecting` with a connection timeout armed.
    ///
    /// # Errors
    ///
    /// Returns an error if `peer_id` is empty or the factory fails; any
    /// previous session for the peer is closed either way.
    #[instrument(skip(self, options), fields(peer_id = %peer_id))]
    pub async fn create_connection(
        &self,
        peer_id: &str,
        options: ConnectOptions,
    ) -> Result<Arc<dyn PeerSession>> {
        self.inner.create_connection(peer_id, options).await
    }

    /// Session for `peer_id`
    pub fn get_connection(&self, peer_id: &str) -> Option<Arc<dyn PeerSession>> {
        let registry = self.inner.registry.lock();
        registry
            .connections
            .get(peer_id)
            .map(|record| Arc::clone(&record.session))
    }

    /// Snapshot of the record for `peer_id`
    pub fn get_connection_info(&self, peer_id: &str) -> Option<ConnectionInfo> {
        let registry = self.inner.registry.lock();
        registry.connections.get(peer_id).map(ConnectionRecord::info)
    }

    /// Unified state for `peer_id`; `Idle` when untracked
    pub fn get_state(&self, peer_id: &str) -> ConnectionState {
        let registry = self.inner.registry.lock();
        registry
            .connections
            .get(peer_id)
            .map(|record| record.state)
            .unwrap_or(ConnectionState::Idle)
    }

    /// Identifiers of every tracked peer
    pub fn get_connection_ids(&self) -> Vec<String> {
        let registry = self.inner.registry.lock();
        registry.connections.keys().cloned().collect()
    }

    /// Snapshot of every tracked record
    pub fn get_all_connections(&self) -> HashMap<String, ConnectionInfo> {
        let registry = self.inner.registry.lock();
        registry
            .connections
            .iter()
            .map(|(peer_id, record)| (peer_id.clone(), record.info()))
            .collect()
    }

    /// Whether `peer_id` is tracked
    pub fn has_connection(&self, peer_id: &str) -> bool {
        self.inner.registry.lock().connections.contains_key(peer_id)
    }

    /// Whether `peer_id` is in `connected`
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.get_state(peer_id) == ConnectionState::Connected
    }

    /// Whether a backoff reconnect timer is armed for `peer_id`
    pub fn has_pending_reconnect(&self, peer_id: &str) -> bool {
        self.inner
            .registry
            .lock()
            .reconnect_timers
            .contains_key(peer_id)
    }

    /// Whether the connection timeout for `peer_id` is still armed
    pub fn has_pending_timeout(&self, peer_id: &str) -> bool {
        self.inner
            .registry
            .lock()
            .timeout_timers
            .contains_key(peer_id)
    }

    /// Pass a remote candidate to the candidate buffer
    pub async fn add_ice_candidate(
        &self,
        peer_id: &str,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition> {
        self.inner.candidates.add_candidate(peer_id, candidate).await
    }

    /// Apply buffered remote candidates for `peer_id` in arrival order
    pub async fn process_pending_candidates(&self, peer_id: &str) -> Result<usize> {
        self.inner.candidates.process_pending(peer_id).await
    }

    /// Number of remote candidates buffered for `peer_id`
    pub async fn pending_candidate_count(&self, peer_id: &str) -> usize {
        self.inner.candidates.pending_count(peer_id).await
    }

    /// Create and apply a local offer for `peer_id`
    pub async fn create_offer(&self, peer_id: &str) -> Result<SessionDescription> {
        self.inner.session(peer_id)?.create_offer().await
    }

    /// Create and apply a local answer for `peer_id`
    pub async fn create_answer(&self, peer_id: &str) -> Result<SessionDescription> {
        self.inner.session(peer_id)?.create_answer().await
    }

    /// Apply a remote description, then flush buffered candidates
    ///
    /// Returns the number of buffered candidates applied.
    pub async fn set_remote_description(
        &self,
        peer_id: &str,
        description: SessionDescription,
    ) -> Result<usize> {
        let session = self.inner.session(peer_id)?;
        session.set_remote_description(description).await?;
        self.inner.candidates.process_pending(peer_id).await
    }

    /// Reset the attempt budget and restart ICE immediately
    ///
    /// This is the only way to revive a `failed` peer. Returns whether the
    /// restart request succeeded; a failed request goes through the normal
    /// failure handling and is visible as `last_error`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PeerNotFound` if `peer_id` is not tracked.
    #[instrument(skip(self), fields(peer_id = %peer_id))]
    pub async fn reconnect(&self, peer_id: &str) -> Result<bool> {
        let epoch = {
            let mut registry = self.inner.registry.lock();
            registry.cancel_timer(TimerKind::Reconnect, peer_id);

            let record = registry
                .connections
                .get_mut(peer_id)
                .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;

            info!("Manual reconnect for peer {}", peer_id);
            record.reconnect_attempts = 0;
            // The restarted session reports both sources afresh
            record.signals = SignalPair::default();
            self.inner.set_state(record, ConnectionState::Reconnecting);
            record.epoch
        };

        Ok(self.inner.attempt_reconnect(peer_id, epoch).await)
    }

    /// Close the session for `peer_id` and forget it
    ///
    /// Idempotent: returns `false` without emitting anything if the peer is
    /// not tracked.
    #[instrument(skip(self), fields(peer_id = %peer_id))]
    pub async fn close_connection(&self, peer_id: &str) -> bool {
        self.inner.close_connection(peer_id).await
    }

    /// Close every tracked session; returns how many were closed
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for peer_id in self.get_connection_ids() {
            if self.inner.close_connection(&peer_id).await {
                closed += 1;
            }
        }
        closed
    }

    /// Close everything and release all buffers and timers
    pub async fn cleanup(&self) {
        let closed = self.close_all().await;
        self.inner.registry.lock().cancel_all_timers();
        self.inner.candidates.cleanup();
        info!("Orchestrator cleanup complete ({} connections closed)", closed);
    }

    /// Transport statistics for `peer_id`; `None` when untracked
    pub async fn get_connection_stats(&self, peer_id: &str) -> Result<Option<ConnectionStats>> {
        match self.get_connection(peer_id) {
            Some(session) => session.connection_stats().await.map(Some),
            None => Ok(None),
        }
    }

    /// Count of tracked connections per state
    pub fn get_summary_stats(&self) -> SummaryStats {
        let registry = self.inner.registry.lock();
        let mut stats = SummaryStats::default();
        for record in registry.connections.values() {
            stats.record(record.state);
        }
        stats
    }
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("connections", &self.inner.registry.lock().connections.len())
            .finish()
    }
}

impl Inner {
    fn session(&self, peer_id: &str) -> Result<Arc<dyn PeerSession>> {
        self.registry
            .lock()
            .connections
            .get(peer_id)
            .map(|record| Arc::clone(&record.session))
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    fn is_current(&self, peer_id: &str, epoch: u64) -> bool {
        self.registry
            .lock()
            .connections
            .get(peer_id)
            .is_some_and(|record| record.epoch == epoch)
    }

    fn set_state(&self, record: &mut ConnectionRecord, to: ConnectionState) {
        let from = record.state;
        if from == to {
            return;
        }
        record.state = to;
        info!("Peer {} state: {} -> {}", record.peer_id, from, to);
        self.events.emit(ConnectionEvent::StateChanged {
            peer_id: record.peer_id.clone(),
            from,
            to,
        });
    }

    async fn create_connection(
        &self,
        peer_id: &str,
        options: ConnectOptions,
    ) -> Result<Arc<dyn PeerSession>> {
        if peer_id.is_empty() {
            return Err(Error::InvalidConfig("peer id must not be empty".to_string()));
        }

        if self.close_connection(peer_id).await {
            debug!("Replaced existing connection for peer {}", peer_id);
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let mut ice_servers = self.ice_servers.ice_servers();
        ice_servers.extend(options.ice_servers);
        let session_config = SessionConfig {
            ice_servers,
            options: options
                .session
                .unwrap_or_else(|| self.config.session.clone()),
        };

        let sink: Weak<dyn SessionEventSink> = self.this.clone();
        let observer = SessionObserver::new(sink, peer_id, epoch);
        let session = self
            .factory
            .create(peer_id, session_config, observer)
            .await?;

        self.candidates.register(peer_id, &session);

        let leftover = {
            let mut registry = self.registry.lock();
            // A concurrent create for the same peer may have finished first
            let leftover = self.remove_locked(&mut registry, peer_id);

            let mut record = ConnectionRecord::new(
                peer_id,
                Arc::clone(&session),
                epoch,
                self.scheduler.now(),
                options.metadata,
            );
            self.events.emit(ConnectionEvent::Created {
                peer_id: peer_id.to_string(),
            });
            self.set_state(&mut record, ConnectionState::Connecting);
            registry.connections.insert(peer_id.to_string(), record);

            let timeout = self.config.connection_timeout();
            let handle = self.arm_timer(TimerKind::Timeout, peer_id, epoch, timeout);
            registry.timeout_timers.insert(peer_id.to_string(), handle);
            debug!(
                "Connection timeout armed for peer {} ({:?})",
                peer_id, timeout
            );

            leftover
        };

        if let Some(old) = leftover {
            if let Err(e) = old.close().await {
                warn!("Failed to close replaced session for peer {}: {}", peer_id, e);
            }
        }

        info!("Created connection for peer {} (epoch {})", peer_id, epoch);

        Ok(session)
    }

    /// Remove the record and its timers, emitting the close notifications
    fn remove_locked(
        &self,
        registry: &mut Registry,
        peer_id: &str,
    ) -> Option<Arc<dyn PeerSession>> {
        registry.cancel_timer(TimerKind::Reconnect, peer_id);
        registry.cancel_timer(TimerKind::Timeout, peer_id);

        let mut record = registry.connections.remove(peer_id)?;
        self.set_state(&mut record, ConnectionState::Closed);
        self.events.emit(ConnectionEvent::Closed {
            peer_id: peer_id.to_string(),
        });
        Some(record.session)
    }

    async fn close_connection(&self, peer_id: &str) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            self.remove_locked(&mut registry, peer_id)
        };

        let Some(session) = removed else {
            debug!("Close requested for untracked peer {}", peer_id);
            return false;
        };

        self.candidates.unregister(peer_id);

        if let Err(e) = session.close().await {
            warn!("Failed to close session for peer {}: {}", peer_id, e);
        }

        info!("Closed connection for peer {}", peer_id);
        true
    }

    fn arm_timer(
        &self,
        kind: TimerKind,
        peer_id: &str,
        epoch: u64,
        delay: Duration,
    ) -> TimerHandle {
        // Filled in before the registry lock is released; the task reads it
        // only after taking that lock
        let slot = Arc::new(AtomicU64::new(0));
        let task_slot = Arc::clone(&slot);
        let this = self.this.clone();
        let peer = peer_id.to_string();

        let handle = self.scheduler.schedule(
            delay,
            Box::pin(async move {
                if let Some(inner) = this.upgrade() {
                    inner.on_timer(kind, &peer, epoch, &task_slot).await;
                }
            }),
        );
        slot.store(handle.id(), Ordering::Release);
        handle
    }

    async fn on_timer(&self, kind: TimerKind, peer_id: &str, epoch: u64, slot: &AtomicU64) {
        {
            let mut registry = self.registry.lock();
            let own_id = slot.load(Ordering::Acquire);
            let timers = registry.timers(kind);
            if timers.get(peer_id).map(TimerHandle::id) != Some(own_id) {
                return;
            }
            timers.remove(peer_id);

            if kind == TimerKind::Timeout {
                let Some(record) = registry.connections.get_mut(peer_id) else {
                    return;
                };
                if record.epoch != epoch || record.state != ConnectionState::Connecting {
                    return;
                }
                warn!(
                    "Connection timeout for peer {} after {}ms",
                    peer_id, self.config.connection_timeout_ms
                );
                self.on_failure(
                    &mut registry,
                    peer_id,
                    Some("connection timeout".to_string()),
                );
                return;
            }
        }

        debug!("Reconnect timer fired for peer {}", peer_id);
        self.attempt_reconnect(peer_id, epoch).await;
    }

    /// Shared failure handler: retry with backoff or give up
    fn on_failure(&self, registry: &mut Registry, peer_id: &str, error: Option<String>) {
        let reconnect_pending = registry.reconnect_timers.contains_key(peer_id);
        let Some(record) = registry.connections.get_mut(peer_id) else {
            return;
        };

        if let Some(error) = error {
            record.last_error = Some(error);
        }

        if matches!(record.state, ConnectionState::Failed | ConnectionState::Closed) {
            return;
        }
        record.recovering = true;

        if reconnect_pending {
            debug!(
                "Failure for peer {} while a reconnect is already scheduled",
                peer_id
            );
            return;
        }

        if self.policy.should_retry(record.reconnect_attempts) {
            self.set_state(record, ConnectionState::Reconnecting);
            self.schedule_reconnect(registry, peer_id);
            return;
        }

        let attempts = record.reconnect_attempts;
        self.set_state(record, ConnectionState::Failed);
        warn!(
            "Peer {} failed after {} reconnect attempts: {}",
            peer_id,
            attempts,
            record.last_error.as_deref().unwrap_or("unknown error")
        );
        self.events.emit(ConnectionEvent::Failed {
            peer_id: peer_id.to_string(),
            error: record.last_error.clone(),
        });
        self.events.emit(ConnectionEvent::ReconnectExhausted {
            peer_id: peer_id.to_string(),
            attempts,
        });

        registry.cancel_timer(TimerKind::Timeout, peer_id);
    }

    fn schedule_reconnect(&self, registry: &mut Registry, peer_id: &str) {
        let Some(record) = registry.connections.get_mut(peer_id) else {
            return;
        };

        let delay = self.policy.calculate_backoff(record.reconnect_attempts);
        record.reconnect_attempts += 1;
        let attempt = record.reconnect_attempts;
        let epoch = record.epoch;

        info!(
            "Scheduling reconnect for peer {} (attempt {}/{}) in {:?}",
            peer_id, attempt, self.policy.max_retries, delay
        );
        self.events.emit(ConnectionEvent::Reconnecting {
            peer_id: peer_id.to_string(),
            attempt,
            max_attempts: self.policy.max_retries,
            delay,
        });

        let handle = self.arm_timer(TimerKind::Reconnect, peer_id, epoch, delay);
        registry.reconnect_timers.insert(peer_id.to_string(), handle);
    }

    fn on_connected(&self, registry: &mut Registry, peer_id: &str) {
        registry.cancel_timer(TimerKind::Reconnect, peer_id);
        registry.cancel_timer(TimerKind::Timeout, peer_id);

        let now = self.scheduler.now();
        let Some(record) = registry.connections.get_mut(peer_id) else {
            return;
        };

        let recovering = std::mem::take(&mut record.recovering);
        let attempts = record.reconnect_attempts;
        record.reconnect_attempts = 0;
        record.connected_at = Some(now);

        self.set_state(record, ConnectionState::Connected);
        self.events.emit(ConnectionEvent::Connected {
            peer_id: peer_id.to_string(),
        });

        if recovering {
            info!("Peer {} reconnected after {} attempts", peer_id, attempts);
            self.events.emit(ConnectionEvent::Reconnected {
                peer_id: peer_id.to_string(),
                attempts,
            });
        }
    }

    /// Ask the session to restart ICE; returns whether the request succeeded
    async fn attempt_reconnect(&self, peer_id: &str, epoch: u64) -> bool {
        let session = {
            let registry = self.registry.lock();
            match registry.connections.get(peer_id) {
                Some(record)
                    if record.epoch == epoch && record.state == ConnectionState::Reconnecting =>
                {
                    Arc::clone(&record.session)
                }
                _ => return false,
            }
        };

        debug!("Restarting ICE for peer {}", peer_id);

        match session.restart_ice().await {
            Ok(offer) => {
                if let Some(offer) = offer {
                    if self.is_current(peer_id, epoch) {
                        self.events.emit(ConnectionEvent::NegotiationNeeded {
                            peer_id: peer_id.to_string(),
                            offer: Some(offer),
                        });
                    }
                }
                true
            }
            Err(e) => {
                warn!("ICE restart failed for peer {}: {}", peer_id, e);

                let mut registry = self.registry.lock();
                let Some(record) = registry.connections.get_mut(peer_id) else {
                    return false;
                };
                if record.epoch != epoch {
                    return false;
                }
                record.last_error = Some(e.to_string());

                // A success signal may have landed while restart_ice was pending
                if record.state != ConnectionState::Connected {
                    self.on_failure(&mut registry, peer_id, None);
                }
                false
            }
        }
    }

    fn on_signal(&self, peer_id: &str, epoch: u64, signal: SessionSignal) {
        let mut registry = self.registry.lock();
        let Some(record) = registry.connections.get_mut(peer_id) else {
            return;
        };
        if record.epoch != epoch {
            debug!("Ignoring {:?} from stale session for peer {}", signal, peer_id);
            return;
        }

        match record.signals.apply(record.state, signal) {
            Transition::Connected => self.on_connected(&mut registry, peer_id),
            Transition::Failure => {
                registry.cancel_timer(TimerKind::Timeout, peer_id);
                let cause = match signal {
                    SessionSignal::Transport(state) => format!("transport state {:?}", state),
                    SessionSignal::Ice(state) => format!("ICE connection state {:?}", state),
                };
                self.on_failure(&mut registry, peer_id, Some(cause));
            }
            Transition::Ignore => {}
        }
    }
}

impl SessionEventSink for Inner {
    fn deliver(&self, peer_id: &str, epoch: u64, event: SessionEvent) {
        match event {
            SessionEvent::ConnectionStateChange(state) => {
                self.on_signal(peer_id, epoch, SessionSignal::Transport(state))
            }
            SessionEvent::IceConnectionStateChange(state) => {
                self.on_signal(peer_id, epoch, SessionSignal::Ice(state))
            }
            SessionEvent::IceCandidate(candidate) if self.is_current(peer_id, epoch) => {
                self.events.emit(ConnectionEvent::IceCandidate {
                    peer_id: peer_id.to_string(),
                    candidate,
                });
            }
            SessionEvent::Track(track) if self.is_current(peer_id, epoch) => {
                info!("Track {} ({}) from peer {}", track.track_id, track.kind, peer_id);
                self.events.emit(ConnectionEvent::Track {
                    peer_id: peer_id.to_string(),
                    track,
                });
            }
            SessionEvent::NegotiationNeeded if self.is_current(peer_id, epoch) => {
                self.events.emit(ConnectionEvent::NegotiationNeeded {
                    peer_id: peer_id.to_string(),
                    offer: None,
                });
            }
            _ => debug!("Ignoring callback from stale session for peer {}", peer_id),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.registry.get_mut().cancel_all_timers();
    }
}
