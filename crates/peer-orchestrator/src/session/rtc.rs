//! webrtc-rs backed session wrapper

use super::{
    IceConnectionState, PeerSession, SessionConfig, SessionFactory, SessionObserver,
    TransportState,
};
use crate::config::{IceServer, IceTransportPolicy};
use crate::types::{ConnectionStats, IceCandidate, SdpType, SessionDescription, TrackInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

fn map_transport_state(state: RTCPeerConnectionState) -> TransportState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => TransportState::New,
        RTCPeerConnectionState::Connecting => TransportState::Connecting,
        RTCPeerConnectionState::Connected => TransportState::Connected,
        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
        RTCPeerConnectionState::Failed => TransportState::Failed,
        RTCPeerConnectionState::Closed => TransportState::Closed,
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}

fn to_rtc_ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| {
            #[allow(clippy::needless_update)]
            RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            }
        })
        .collect()
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(Error::SdpError(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    parsed.map_err(|e| Error::SdpError(format!("Failed to parse {}: {}", description.sdp_type, e)))
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

/// Session wrapper around a webrtc-rs `RTCPeerConnection`
pub struct RtcSession {
    /// Remote peer identifier
    peer_id: String,

    /// Unique identifier for this connection instance
    connection_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcSession {
    /// Create a peer connection and wire its callbacks to `observer`
    ///
    /// # Arguments
    ///
    /// * `peer_id` - Unique identifier for the remote peer
    /// * `config` - STUN/TURN servers and passthrough options
    /// * `observer` - Receives lifecycle callbacks
    #[instrument(skip(config, observer), fields(peer_id = %peer_id))]
    pub async fn new(peer_id: &str, config: SessionConfig, observer: SessionObserver) -> Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer session: peer_id={}, connection_id={}",
            peer_id, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: to_rtc_ice_servers(&config.ice_servers),
            ice_transport_policy: match config.options.ice_transport_policy {
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            },
            ice_candidate_pool_size: config.options.ice_candidate_pool_size,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        Self::wire_callbacks(&peer_connection, observer);

        Ok(Self {
            peer_id: peer_id.to_string(),
            connection_id,
            peer_connection,
        })
    }

    fn wire_callbacks(peer_connection: &RTCPeerConnection, observer: SessionObserver) {
        let obs = observer.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let obs = obs.clone();
                Box::pin(async move {
                    debug!("Peer {} transport state: {}", obs.peer_id(), state);
                    obs.on_connection_state_change(map_transport_state(state));
                })
            },
        ));

        let obs = observer.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let obs = obs.clone();
                Box::pin(async move {
                    debug!("Peer {} ICE state: {}", obs.peer_id(), state);
                    obs.on_ice_connection_state_change(map_ice_state(state));
                })
            },
        ));

        let obs = observer.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let obs = obs.clone();
            Box::pin(async move {
                // None marks end of gathering
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => obs.on_ice_candidate(IceCandidate::from(init)),
                    Err(e) => warn!(
                        "Failed to serialize local candidate for peer {}: {}",
                        obs.peer_id(),
                        e
                    ),
                }
            })
        }));

        let obs = observer.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let obs = obs.clone();
                Box::pin(async move {
                    obs.on_track(TrackInfo {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind: track.kind().to_string(),
                        ssrc: track.ssrc(),
                    });
                })
            },
        ));

        let obs = observer;
        peer_connection.on_negotiation_needed(Box::new(move || {
            let obs = obs.clone();
            Box::pin(async move {
                obs.on_negotiation_needed();
            })
        }));
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Underlying webrtc-rs peer connection, for adding tracks or data channels
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    async fn local_description(&self, sdp_type: SdpType) -> Result<SessionDescription> {
        let local = self.peer_connection.local_description().await.ok_or_else(|| {
            Error::SdpError(format!("No local description after creating {}", sdp_type))
        })?;

        Ok(SessionDescription {
            sdp_type,
            sdp: local.sdp,
        })
    }
}

#[async_trait]
impl PeerSession for RtcSession {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn connection_state(&self) -> TransportState {
        map_transport_state(self.peer_connection.connection_state())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        map_ice_state(self.peer_connection.ice_connection_state())
    }

    async fn has_remote_description(&self) -> bool {
        self.peer_connection.remote_description().await.is_some()
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP offer for peer {}", self.peer_id);

        self.local_description(SdpType::Offer).await
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        debug!("Created SDP answer for peer {}", self.peer_id);

        self.local_description(SdpType::Answer).await
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        debug!(
            "Setting remote {} for peer {}",
            description.sdp_type, self.peer_id
        );

        let description = to_rtc_description(description)?;

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!(
            "Adding ICE candidate for peer {}: {}",
            self.peer_id, candidate.candidate
        );

        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit::from(candidate))
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn restart_ice(&self) -> Result<Option<SessionDescription>> {
        let offer = self
            .peer_connection
            .create_offer(Some(RTCOfferOptions {
                ice_restart: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::NegotiationError(format!("ICE restart failed: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to apply ICE restart offer: {}", e))
            })?;

        debug!("ICE restart offer created for peer {}", self.peer_id);

        self.local_description(SdpType::Offer).await.map(Some)
    }

    async fn connection_stats(&self) -> Result<ConnectionStats> {
        let report = self.peer_connection.get_stats().await;
        let mut stats = ConnectionStats::default();

        for entry in report.reports.values() {
            match entry {
                StatsReportType::CandidatePair(pair) if pair.nominated => {
                    stats.bytes_received = pair.bytes_received;
                    stats.bytes_sent = pair.bytes_sent;
                    if pair.current_round_trip_time > 0.0 {
                        stats.round_trip_time = Some(pair.current_round_trip_time);
                    }
                }
                StatsReportType::RemoteInboundRTP(remote) => {
                    stats.packets_lost += remote.packets_lost.max(0) as u64;
                }
                _ => {}
            }
        }

        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer session for peer {}", self.peer_id);

        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}

/// Factory producing [`RtcSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcSessionFactory;

impl RtcSessionFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionFactory for RtcSessionFactory {
    async fn create(
        &self,
        peer_id: &str,
        config: SessionConfig,
        observer: SessionObserver,
    ) -> Result<Arc<dyn PeerSession>> {
        let session = RtcSession::new(peer_id, config, observer).await?;
        Ok(Arc::new(session))
    }
}
