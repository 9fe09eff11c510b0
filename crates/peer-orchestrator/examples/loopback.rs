//! Two in-process orchestrators connected through an in-memory signaling relay
//!
//! Run with `RUST_LOG=peer_orchestrator=debug cargo run --example loopback`.

use async_trait::async_trait;
use peer_orchestrator::{
    ConnectOptions, ConnectionEvent, ConnectionOrchestrator, OrchestratorConfig, PeerSession,
    RtcSession, RtcSessionFactory, SessionConfig, SessionFactory, SessionObserver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Opens a data channel on every session so the offer has something to negotiate
struct DataChannelFactory;

#[async_trait]
impl SessionFactory for DataChannelFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: SessionConfig,
        observer: SessionObserver,
    ) -> peer_orchestrator::Result<Arc<dyn PeerSession>> {
        let session = RtcSession::new(peer_id, config, observer).await?;
        session
            .peer_connection()
            .create_data_channel("control", None)
            .await?;
        Ok(Arc::new(session))
    }
}

/// Forward local candidates gathered by `from` to the matching peer on `to`
fn relay(
    mut events: broadcast::Receiver<ConnectionEvent>,
    to: ConnectionOrchestrator,
    local_name: &'static str,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::IceCandidate { candidate, .. }) => {
                    if let Err(e) = to.add_ice_candidate(local_name, candidate).await {
                        warn!("Relay {} -> remote failed: {}", local_name, e);
                    }
                }
                Ok(ConnectionEvent::StateChanged { peer_id, from, to }) => {
                    info!("[{}] {}: {} -> {}", local_name, peer_id, from, to);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Relay for {} lagged by {} events", local_name, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn wait_connected(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    peer: &str,
) -> anyhow::Result<()> {
    loop {
        match events.recv().await? {
            ConnectionEvent::Connected { peer_id } if peer_id == peer => return Ok(()),
            ConnectionEvent::Failed { peer_id, error } if peer_id == peer => {
                anyhow::bail!("peer {} failed: {:?}", peer_id, error)
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Host candidates are enough on loopback
    let config = OrchestratorConfig {
        ice_servers: Vec::new(),
        ..OrchestratorConfig::low_latency_preset()
    };

    let alice = ConnectionOrchestrator::new(config.clone(), Arc::new(DataChannelFactory))?;
    let bob = ConnectionOrchestrator::new(config, Arc::new(RtcSessionFactory::new()))?;

    let mut alice_events = alice.subscribe();
    relay(alice.subscribe(), bob.clone(), "alice");
    relay(bob.subscribe(), alice.clone(), "bob");

    alice
        .create_connection("bob", ConnectOptions::default())
        .await?;
    bob.create_connection("alice", ConnectOptions::default())
        .await?;

    let offer = alice.create_offer("bob").await?;
    bob.set_remote_description("alice", offer).await?;
    let answer = bob.create_answer("alice").await?;
    let flushed = alice.set_remote_description("bob", answer).await?;
    info!("Answer applied, {} early candidates flushed", flushed);

    tokio::time::timeout(
        Duration::from_secs(10),
        wait_connected(&mut alice_events, "bob"),
    )
    .await??;

    if let Some(info) = alice.get_connection_info("bob") {
        info!("alice -> bob connected after {:?}", info.created_at.elapsed());
    }
    if let Some(stats) = alice.get_connection_stats("bob").await? {
        info!(
            "alice -> bob: sent={}B received={}B rtt={:?}",
            stats.bytes_sent, stats.bytes_received, stats.round_trip_time
        );
    }
    info!("Summary: {:?}", alice.get_summary_stats());

    alice.cleanup().await;
    bob.cleanup().await;

    Ok(())
}
