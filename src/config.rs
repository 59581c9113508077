//! Configuration types for television routing.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Default port for TLS WebSocket connections to the television.
const DEFAULT_SECURE_PORT: u16 = 3001;

/// Default port for plaintext WebSocket connections.
const DEFAULT_PLAIN_PORT: u16 = 3000;

/// Configuration for the relay session.
///
/// Use [`RelayConfig::default()`] for sensible defaults, or customize as
/// needed. The struct derives serde traits so an embedding application can
/// persist it in whatever format it already uses; this crate never touches a
/// configuration file itself.
///
/// # Example
///
/// ```
/// use tv_volume_relay::RelayConfig;
///
/// let config = RelayConfig {
///     address: "192.168.1.50".into(),
///     mac_address: "AA:BB:CC:DD:EE:FF".into(),
///     ..Default::default()
/// };
/// assert_eq!(config.url(), "wss://192.168.1.50:3001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Network address of the television (IPv4 dotted quad).
    ///
    /// Empty means unconfigured; no command will be attempted.
    /// Default: empty
    pub address: String,

    /// Expected MAC address of the television.
    ///
    /// Compared against the address's resolved neighbor entry before every
    /// connection; separators and case are ignored. Empty means
    /// unconfigured; no command will be attempted.
    /// Default: empty
    pub mac_address: String,

    /// WebSocket port on the television.
    ///
    /// A zero port falls back to the scheme default (3001 secure, 3000
    /// plain) when the URL is derived.
    /// Default: 3001
    pub port: u16,

    /// Whether to connect over TLS (`wss://`) rather than plaintext.
    ///
    /// Certificate validation is relaxed either way; televisions present
    /// self-signed certificates on their local-network port.
    /// Default: true
    pub secure: bool,

    /// Case-insensitive substring matched against the default playback
    /// device's friendly name to decide whether it is the television.
    ///
    /// An empty hint matches nothing.
    /// Default: "LG"
    pub device_hint: String,

    /// Route keys only while the playback device reports spatial audio
    /// (Dolby Atmos) availability.
    ///
    /// Default: true
    pub only_when_atmos: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            mac_address: String::new(),
            port: DEFAULT_SECURE_PORT,
            secure: true,
            device_hint: "LG".to_string(),
            only_when_atmos: true,
        }
    }
}

impl RelayConfig {
    /// Returns the WebSocket URL for the configured television.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.address, self.effective_port())
    }

    /// Returns the configured port, or the scheme default when zero.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            self.port
        } else if self.secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PLAIN_PORT
        }
    }
}

/// Live view of the configuration, shared between the session and the
/// protocol client so an edit takes effect on the next command.
#[derive(Clone)]
pub(crate) struct SharedConfig(Arc<RwLock<RelayConfig>>);

impl SharedConfig {
    pub fn new(config: RelayConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Returns a copy of the current configuration.
    pub fn snapshot(&self) -> RelayConfig {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the configuration.
    pub fn store(&self, config: RelayConfig) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = config;
    }
}
