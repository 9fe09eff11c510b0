//! Connection lifecycle: create, replace, close, accessors, stats and events

mod harness;

use harness::{count, drain, fast_config, names, orchestrator};
use peer_orchestrator::{
    ConnectOptions, ConnectionEvent, ConnectionOrchestrator, ConnectionState, ConnectionStats,
    Error, IceServer, IceTransportPolicy, OrchestratorConfig, SdpType, SessionOptions,
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

#[tokio::test(start_paused = true)]
async fn test_create_connection_starts_connecting() {
    let (orchestrator, factory) = orchestrator(fast_config());
    let mut rx = orchestrator.subscribe();

    let options = ConnectOptions::default().with_metadata("room", serde_json::json!("lobby"));
    assert_ok!(orchestrator.create_connection("peer-a", options).await);

    assert_eq!(orchestrator.get_state("peer-a"), ConnectionState::Connecting);
    assert!(orchestrator.has_connection("peer-a"));
    assert!(!orchestrator.is_connected("peer-a"));
    assert!(orchestrator.has_pending_timeout("peer-a"));
    assert!(!orchestrator.has_pending_reconnect("peer-a"));
    assert_eq!(factory.created_count(), 1);

    let info = orchestrator.get_connection_info("peer-a").unwrap();
    assert_eq!(info.reconnect_attempts, 0);
    assert!(info.connected_at.is_none());
    assert_eq!(info.metadata["room"], serde_json::json!("lobby"));

    let events = drain(&mut rx);
    assert_eq!(names(&events), vec!["created", "state_changed"]);
    assert_eq!(
        events[1],
        ConnectionEvent::StateChanged {
            peer_id: "peer-a".to_string(),
            from: ConnectionState::Idle,
            to: ConnectionState::Connecting,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_connected_signal_records_connection_time() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    let mut rx = orchestrator.subscribe();

    factory.session("peer-a").connect();

    assert!(orchestrator.is_connected("peer-a"));
    assert!(!orchestrator.has_pending_timeout("peer-a"));

    let events = drain(&mut rx);
    assert_eq!(names(&events), vec!["state_changed", "connected"]);

    harness::advance(2_000).await;
    let info = orchestrator.get_connection_info("peer-a").unwrap();
    assert_eq!(
        info.connected_for(),
        Some(std::time::Duration::from_millis(2_000))
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_twice_replaces_previous_session() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();

    let first = factory.session("peer-a");
    first.fail();
    assert!(orchestrator.has_pending_reconnect("peer-a"));
    orchestrator
        .add_ice_candidate("peer-a", peer_orchestrator::IceCandidate::new("early"))
        .await
        .unwrap();
    assert_eq!(orchestrator.pending_candidate_count("peer-a").await, 1);

    let mut rx = orchestrator.subscribe();
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();

    assert_eq!(orchestrator.get_connection_ids(), vec!["peer-a".to_string()]);
    assert_eq!(first.close_calls(), 1);
    assert!(!orchestrator.has_pending_reconnect("peer-a"));
    assert!(orchestrator.has_pending_timeout("peer-a"));
    assert_eq!(orchestrator.pending_candidate_count("peer-a").await, 0);
    assert_eq!(orchestrator.get_state("peer-a"), ConnectionState::Connecting);

    let second = factory.session("peer-a");
    assert!(second.epoch() > first.epoch());

    let events = drain(&mut rx);
    assert_eq!(
        names(&events),
        vec!["state_changed", "closed", "created", "state_changed"]
    );

    // The cancelled reconnect timer never fires against the new record
    harness::advance(1_000).await;
    assert_eq!(first.restart_calls(), 0);
    assert_eq!(second.restart_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_signals_from_replaced_session_are_ignored() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    let stale = factory.session("peer-a");
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    let mut rx = orchestrator.subscribe();

    stale.fail();
    stale.connect();
    stale.gather("candidate:stale");
    stale.need_negotiation();

    assert_eq!(orchestrator.get_state("peer-a"), ConnectionState::Connecting);
    assert!(drain(&mut rx).is_empty());

    factory.session("peer-a").connect();
    assert!(orchestrator.is_connected("peer-a"));
}

#[tokio::test(start_paused = true)]
async fn test_close_connection_is_idempotent() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    factory.session("peer-a").fail();
    let mut rx = orchestrator.subscribe();

    assert!(orchestrator.close_connection("peer-a").await);
    assert!(!orchestrator.close_connection("peer-a").await);

    let events = drain(&mut rx);
    assert_eq!(count(&events, "closed"), 1);
    assert_eq!(
        events[0],
        ConnectionEvent::StateChanged {
            peer_id: "peer-a".to_string(),
            from: ConnectionState::Reconnecting,
            to: ConnectionState::Closed,
        }
    );

    assert_eq!(factory.session("peer-a").close_calls(), 1);
    assert!(!orchestrator.has_connection("peer-a"));
    assert!(!orchestrator.has_pending_reconnect("peer-a"));
    assert!(!orchestrator.has_pending_timeout("peer-a"));
    assert_eq!(orchestrator.get_state("peer-a"), ConnectionState::Idle);

    harness::advance(10_000).await;
    assert_eq!(factory.session("peer-a").restart_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_all_and_cleanup() {
    let (orchestrator, factory) = orchestrator(fast_config());
    for peer in ["a", "b", "c"] {
        orchestrator
            .create_connection(peer, ConnectOptions::default())
            .await
            .unwrap();
    }
    factory.session("b").fail();

    assert_eq!(orchestrator.close_all().await, 3);
    assert!(orchestrator.get_connection_ids().is_empty());
    for peer in ["a", "b", "c"] {
        assert_eq!(factory.session(peer).close_calls(), 1);
        assert!(!orchestrator.has_pending_timeout(peer));
    }
    assert!(!orchestrator.has_pending_reconnect("b"));

    orchestrator
        .create_connection("d", ConnectOptions::default())
        .await
        .unwrap();
    orchestrator.cleanup().await;

    assert!(!orchestrator.has_connection("d"));
    assert_err!(
        orchestrator
            .add_ice_candidate("d", peer_orchestrator::IceCandidate::new("late"))
            .await
    );
}

#[tokio::test(start_paused = true)]
async fn test_summary_stats_sum_to_total() {
    let (orchestrator, factory) = orchestrator(fast_config());
    for peer in ["a", "b", "c", "d"] {
        orchestrator
            .create_connection(peer, ConnectOptions::default())
            .await
            .unwrap();
    }
    factory.session("a").connect();
    factory.session("b").fail();

    let stats = orchestrator.get_summary_stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.connected, 1);
    assert_eq!(stats.reconnecting, 1);
    assert_eq!(stats.connecting, 2);

    let sum: usize = ConnectionState::ALL.iter().map(|s| stats.count(*s)).sum();
    assert_eq!(sum, stats.total);

    orchestrator.close_connection("c").await;
    let stats = orchestrator.get_summary_stats();
    let sum: usize = ConnectionState::ALL.iter().map(|s| stats.count(*s)).sum();
    assert_eq!(stats.total, 3);
    assert_eq!(sum, 3);
}

#[tokio::test(start_paused = true)]
async fn test_connection_stats_forwarded_from_session() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    factory.session("peer-a").set_stats(ConnectionStats {
        bytes_received: 2048,
        bytes_sent: 1024,
        packets_lost: 3,
        round_trip_time: Some(0.045),
    });

    let stats = orchestrator
        .get_connection_stats("peer-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.bytes_received, 2048);
    assert_eq!(stats.packets_lost, 3);
    assert_eq!(stats.round_trip_time, Some(0.045));

    assert!(orchestrator
        .get_connection_stats("ghost")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_session_callbacks_become_events() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();
    let mut rx = orchestrator.subscribe();
    let session = factory.session("peer-a");

    session.gather("candidate:1 1 udp 2122260223 192.168.1.2 50000 typ host");
    session.receive_track("mic");
    session.need_negotiation();

    let events = drain(&mut rx);
    assert_eq!(names(&events), vec!["ice_candidate", "track", "negotiation_needed"]);
    match &events[0] {
        ConnectionEvent::IceCandidate { peer_id, candidate } => {
            assert_eq!(peer_id, "peer-a");
            assert!(candidate.candidate.contains("typ host"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        events[2],
        ConnectionEvent::NegotiationNeeded {
            peer_id: "peer-a".to_string(),
            offer: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_offer_answer_through_orchestrator() {
    let (orchestrator, factory) = orchestrator(fast_config());
    orchestrator
        .create_connection("peer-a", ConnectOptions::default())
        .await
        .unwrap();

    let offer = orchestrator.create_offer("peer-a").await.unwrap();
    assert_eq!(offer.sdp_type, SdpType::Offer);

    assert_err!(orchestrator.create_answer("peer-a").await);
    orchestrator
        .set_remote_description("peer-a", offer)
        .await
        .unwrap();
    let answer = orchestrator.create_answer("peer-a").await.unwrap();
    assert_eq!(answer.sdp_type, SdpType::Answer);
    assert!(factory.session("peer-a").applied_candidates().is_empty());

    assert!(matches!(
        orchestrator.create_offer("ghost").await,
        Err(Error::PeerNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_ice_servers_from_source_merged_with_overrides() {
    harness::init_logging();
    let factory = harness::MockSessionFactory::new();
    let orchestrator = ConnectionOrchestrator::builder(factory.clone())
        .config(OrchestratorConfig {
            session: SessionOptions {
                ice_transport_policy: IceTransportPolicy::All,
                ice_candidate_pool_size: 2,
            },
            ..fast_config()
        })
        .ice_server_source(Arc::new(|| {
            vec![IceServer::stun("stun:stun.example.com:3478")]
        }))
        .build()
        .unwrap();

    let options = ConnectOptions::default().with_ice_servers(vec![IceServer::turn(
        "turn:turn.example.com:3478",
        "user",
        "secret",
    )]);
    orchestrator.create_connection("peer-a", options).await.unwrap();

    let config = factory.session("peer-a").config().clone();
    assert_eq!(config.ice_servers.len(), 2);
    assert_eq!(config.ice_servers[0].urls[0], "stun:stun.example.com:3478");
    assert_eq!(config.ice_servers[1].username, "user");
    assert_eq!(config.options.ice_candidate_pool_size, 2);

    let relay_only = ConnectOptions {
        session: Some(SessionOptions {
            ice_transport_policy: IceTransportPolicy::Relay,
            ice_candidate_pool_size: 0,
        }),
        ..Default::default()
    };
    orchestrator.create_connection("peer-b", relay_only).await.unwrap();
    assert_eq!(
        factory.session("peer-b").config().options.ice_transport_policy,
        IceTransportPolicy::Relay
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_connection_errors() {
    let (orchestrator, factory) = orchestrator(fast_config());

    assert!(matches!(
        orchestrator
            .create_connection("", ConnectOptions::default())
            .await,
        Err(Error::InvalidConfig(_))
    ));

    factory.fail_next();
    assert!(matches!(
        orchestrator
            .create_connection("peer-a", ConnectOptions::default())
            .await,
        Err(Error::WebRtcError(_))
    ));
    assert!(!orchestrator.has_connection("peer-a"));
    assert!(!orchestrator.has_pending_timeout("peer-a"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = OrchestratorConfig {
        backoff_multiplier: 0.5,
        ..Default::default()
    };
    let result = ConnectionOrchestrator::new(config, harness::MockSessionFactory::new());
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
