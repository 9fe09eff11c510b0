//! Configuration types for the connection orchestrator

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for ConnectionOrchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum automatic reconnection attempts per failure episode (default: 5)
    pub max_reconnect_attempts: u32,

    /// Initial reconnection backoff in milliseconds (default: 1000)
    pub reconnect_delay_ms: u64,

    /// Maximum reconnection backoff in milliseconds (default: 30000)
    pub max_reconnect_delay_ms: u64,

    /// Reconnection backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,

    /// Time a new connection may stay in `connecting` before it counts as
    /// a failure, in milliseconds (default: 30000)
    pub connection_timeout_ms: u64,

    /// STUN/TURN servers used when no other source is installed
    pub ice_servers: Vec<IceServer>,

    /// Options passed through to every session
    pub session: SessionOptions,

    /// Capacity of the event broadcast channel (default: 256)
    pub event_capacity: usize,
}

/// STUN/TURN server descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (`stun:`, `stuns:`, `turn:` or `turns:`)
    pub urls: Vec<String>,

    /// Username for TURN authentication
    #[serde(default)]
    pub username: String,

    /// Credential for TURN authentication
    #[serde(default)]
    pub credential: String,
}

impl IceServer {
    /// STUN server without credentials
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }

    /// TURN server with long-term credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: username.into(),
            credential: credential.into(),
        }
    }
}

/// Session-level options forwarded to the session wrapper untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Which candidates ICE may use
    pub ice_transport_policy: IceTransportPolicy,

    /// Number of candidates to pre-gather (0 disables pre-gathering)
    pub ice_candidate_pool_size: u8,
}

/// ICE transport policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Any candidate type (default)
    #[default]
    All,
    /// Only TURN relay candidates
    Relay,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30000,
            backoff_multiplier: 2.0,
            connection_timeout_ms: 30000,
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
            session: SessionOptions::default(),
            event_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `reconnect_delay_ms` is zero or larger than `max_reconnect_delay_ms`
    /// - `backoff_multiplier` is below 1.0 or not finite
    /// - `connection_timeout_ms` or `event_capacity` is zero
    /// - an ICE server has no URL or an unknown URL scheme
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.reconnect_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "reconnect_delay_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.reconnect_delay_ms, self.max_reconnect_delay_ms
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.connection_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "connection_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(Error::InvalidConfig(
                    "ICE server entry has no URLs".to_string(),
                ));
            }
            for url in &server.urls {
                let known = ["stun:", "stuns:", "turn:", "turns:"]
                    .iter()
                    .any(|scheme| url.starts_with(scheme));
                if !known {
                    return Err(Error::InvalidConfig(format!(
                        "ICE server URL must start with stun:, stuns:, turn: or turns:, got {}",
                        url
                    )));
                }
            }
        }

        Ok(())
    }

    /// Connection timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Load and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON document
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file, picking the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            other => Err(crate::Error::InvalidConfig(format!(
                "unsupported config file extension: {:?}",
                other
            ))),
        }
    }

    /// Create a configuration preset optimized for low latency
    ///
    /// Retries quickly and gives up on a stalled first connection sooner.
    ///
    /// # Example
    ///
    /// ```
    /// use peer_orchestrator::OrchestratorConfig;
    ///
    /// let config = OrchestratorConfig::low_latency_preset();
    /// assert_eq!(config.reconnect_delay_ms, 250);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn low_latency_preset() -> Self {
        Self {
            max_reconnect_attempts: 10,
            reconnect_delay_ms: 250,
            max_reconnect_delay_ms: 5000,
            backoff_multiplier: 1.5,
            connection_timeout_ms: 15000,
            ..Default::default()
        }
    }

    /// Create a configuration preset optimized for mobile networks
    ///
    /// Longer timeouts for cellular handoffs, more retries with slower
    /// backoff growth. TURN servers should be added with `with_ice_servers()`.
    pub fn mobile_network_preset() -> Self {
        Self {
            max_reconnect_attempts: 15,
            reconnect_delay_ms: 2000,
            max_reconnect_delay_ms: 60000,
            backoff_multiplier: 1.5,
            connection_timeout_ms: 45000,
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
            ..Default::default()
        }
    }

    /// Append ICE servers to this configuration
    pub fn with_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers.extend(servers);
        self
    }

    /// Set the maximum number of automatic reconnection attempts
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}
