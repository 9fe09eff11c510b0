//! Candidate buffer
//!
//! Remote ICE candidates often arrive over signaling before the remote
//! description has been applied, and a session rejects candidates in that
//! window. The buffer keeps them per peer, in arrival order, until the
//! description lands, then applies them in that exact order.
//!
//! Each peer entry has its own async lock, so applying candidates for one
//! peer never waits on another and a flush can't interleave with a
//! concurrent `add_candidate` for the same peer.

use crate::session::PeerSession;
use crate::types::IceCandidate;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// What happened to a candidate passed to [`CandidateBuffer::add_candidate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Applied to the session immediately
    Applied,
    /// Queued until the remote description is applied
    Buffered,
}

struct Entry {
    /// Non-owning: the orchestrator owns the session
    session: Weak<dyn PeerSession>,
    pending: VecDeque<IceCandidate>,
}

impl Entry {
    fn session(&self, peer_id: &str) -> Result<Arc<dyn PeerSession>> {
        self.session
            .upgrade()
            .ok_or_else(|| Error::SessionClosed(peer_id.to_string()))
    }

    /// Apply queued candidates in arrival order; failures are logged and skipped
    async fn drain(&mut self, peer_id: &str, session: &dyn PeerSession) -> usize {
        let mut applied = 0;
        while let Some(candidate) = self.pending.pop_front() {
            match session.add_ice_candidate(candidate).await {
                Ok(()) => applied += 1,
                Err(e) => warn!("Failed to apply buffered candidate for peer {}: {}", peer_id, e),
            }
        }
        applied
    }
}

type Slot = Arc<tokio::sync::Mutex<Entry>>;

/// Per-peer FIFO of remote candidates awaiting a remote description
#[derive(Default)]
pub struct CandidateBuffer {
    entries: Mutex<HashMap<String, Slot>>,
}

impl CandidateBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, peer_id: &str) -> Result<Slot> {
        self.entries
            .lock()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))
    }

    /// Associate `peer_id` with a live session
    ///
    /// Replaces any previous association and discards its queued candidates.
    pub fn register(&self, peer_id: &str, session: &Arc<dyn PeerSession>) {
        let entry = Entry {
            session: Arc::downgrade(session),
            pending: VecDeque::new(),
        };
        let previous = self
            .entries
            .lock()
            .insert(peer_id.to_string(), Arc::new(tokio::sync::Mutex::new(entry)));

        if previous.is_some() {
            debug!("Replaced candidate buffer registration for peer {}", peer_id);
        }
    }

    /// Drop the association and any queued candidates; returns whether one existed
    pub fn unregister(&self, peer_id: &str) -> bool {
        self.entries.lock().remove(peer_id).is_some()
    }

    /// Whether `peer_id` is registered
    pub fn is_registered(&self, peer_id: &str) -> bool {
        self.entries.lock().contains_key(peer_id)
    }

    /// Apply `candidate` now if the remote description is set, otherwise queue it
    ///
    /// Candidates queued earlier are always applied first, so arrival order
    /// is preserved even if the description landed without a flush.
    pub async fn add_candidate(
        &self,
        peer_id: &str,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition> {
        let slot = self.slot(peer_id)?;
        let mut entry = slot.lock().await;
        let session = entry.session(peer_id)?;

        if !session.has_remote_description().await {
            entry.pending.push_back(candidate);
            debug!(
                "Buffered ICE candidate for peer {} ({} pending)",
                peer_id,
                entry.pending.len()
            );
            return Ok(CandidateDisposition::Buffered);
        }

        if !entry.pending.is_empty() {
            entry.drain(peer_id, session.as_ref()).await;
        }

        session.add_ice_candidate(candidate).await?;
        Ok(CandidateDisposition::Applied)
    }

    /// Apply every queued candidate for `peer_id` in arrival order, then clear the queue
    ///
    /// Returns the number of candidates the session accepted. Without a remote
    /// description the queue is left untouched and nothing is applied.
    pub async fn process_pending(&self, peer_id: &str) -> Result<usize> {
        let slot = self.slot(peer_id)?;
        let mut entry = slot.lock().await;

        if entry.pending.is_empty() {
            return Ok(0);
        }

        let session = match entry.session(peer_id) {
            Ok(session) => session,
            Err(e) => {
                entry.pending.clear();
                return Err(e);
            }
        };

        if !session.has_remote_description().await {
            debug!(
                "Remote description not set for peer {}, keeping {} candidates queued",
                peer_id,
                entry.pending.len()
            );
            return Ok(0);
        }

        let queued = entry.pending.len();
        let applied = entry.drain(peer_id, session.as_ref()).await;
        debug!(
            "Flushed {} buffered candidates for peer {} ({} applied)",
            queued, peer_id, applied
        );

        Ok(applied)
    }

    /// Number of candidates queued for `peer_id`
    pub async fn pending_count(&self, peer_id: &str) -> usize {
        match self.slot(peer_id) {
            Ok(slot) => slot.lock().await.pending.len(),
            Err(_) => 0,
        }
    }

    /// Drop every association
    pub fn cleanup(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            debug!("Releasing candidate buffers for {} peers", entries.len());
        }
        entries.clear();
    }
}

impl std::fmt::Debug for CandidateBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateBuffer")
            .field("peers", &self.entries.lock().len())
            .finish()
    }
}
