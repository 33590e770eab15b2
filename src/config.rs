//! Configuration
//!
//! Defaults plus environment overrides. Binaries layer CLI flags on top.

use std::net::SocketAddr;
use thiserror::Error;

/// Default relay endpoint used by clients.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8080/ws";

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Relay URL must use ws:// or wss://.
    #[error("relay url must start with ws:// or wss://: {0}")]
    InvalidRelayUrl(String),
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Peer-side connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket endpoint, without query string.
    pub relay_url: String,
    /// Outbound message queue capacity.
    pub outbound_buffer: usize,
    /// Inbound event queue capacity.
    pub inbound_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            outbound_buffer: 32,
            inbound_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// - `TICTACTOE_RELAY_URL`: relay endpoint
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("TICTACTOE_RELAY_URL") {
            config = config.with_relay_url(url)?;
        }
        Ok(config)
    }

    /// Replace the relay endpoint after validating its scheme.
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidRelayUrl(url));
        }
        self.relay_url = url;
        Ok(self)
    }
}

// =============================================================================
// RELAY
// =============================================================================

/// Relay server settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// WebSocket endpoint path.
    pub ws_path: String,
    /// Per-peer outbound frame queue capacity.
    pub peer_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            ws_path: "/ws".to_string(),
            peer_buffer: 64,
        }
    }
}

impl RelayConfig {
    /// Create config from environment variables.
    ///
    /// - `TICTACTOE_BIND`: full bind address, wins over `PORT`
    /// - `PORT`: bind `0.0.0.0:$PORT`
    /// - `TICTACTOE_MAX_CONNECTIONS`: connection cap
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<SocketAddr>("TICTACTOE_BIND")? {
            config.bind_addr = addr;
        } else if let Some(port) = env_parse::<u16>("PORT")? {
            config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }

        if let Some(max) = env_parse::<usize>("TICTACTOE_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }

        Ok(config)
    }
}
