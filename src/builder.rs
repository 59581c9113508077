//! Builder pattern for `VolumeRelay`.

use std::sync::Arc;

use crate::client::TvClient;
use crate::config::SharedConfig;
use crate::dispatch::KeyDispatcher;
use crate::routing::RoutingEngine;
use crate::session::Relay;
use crate::{
    event_callback, EventCallback, HostVolume, KeyStore, MacAddress, NeighborResolver,
    RelayConfig, RelayError, RelayEvent, SystemNeighbors,
};

/// Builder for configuring and starting the relay.
///
/// Use [`VolumeRelay::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use tv_volume_relay::{VolumeRelay, RelayConfig, KeyStore};
///
/// let relay = VolumeRelay::builder()
///     .config(RelayConfig {
///         address: "192.168.1.34".into(),
///         mac_address: "AA:BB:CC:DD:EE:FF".into(),
///         ..RelayConfig::default()
///     })
///     .key_store(KeyStore::at("/var/lib/tv-volume-relay/client_key.txt"))
///     .on_event(|event| println!("{event:?}"))
///     .start()
///     .await?;
/// ```
///
/// [`VolumeRelay::builder()`]: crate::VolumeRelay::builder
#[must_use]
pub struct RelayBuilder {
    /// Television address, binding MAC, and routing policy.
    config: RelayConfig,
    /// Host mixer seam; absent in tests that only care about verdicts.
    host: Option<Arc<dyn HostVolume>>,
    /// Client-key persistence. Required.
    key_store: Option<KeyStore>,
    /// Neighbor-table lookup used for MAC binding checks.
    resolver: Arc<dyn NeighborResolver>,
    /// Event callback.
    event_callback: Option<EventCallback>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            host: None,
            key_store: None,
            resolver: Arc::new(SystemNeighbors),
            event_callback: None,
        }
    }

    /// Set the relay configuration.
    ///
    /// Default: [`RelayConfig::default()`] (no television address, device
    /// hint `"LG"`, spatial-audio gating on).
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the host volume control used to save, force, and restore the
    /// host output level around routing transitions.
    ///
    /// Without one the relay still decides routing and claims keys; only
    /// the host-level bookkeeping is skipped.
    pub fn host_volume<H: HostVolume + 'static>(mut self, host: H) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    /// Set where the pairing client key is persisted. Required.
    pub fn key_store(mut self, store: KeyStore) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Set the neighbor-table resolver used for MAC binding checks.
    ///
    /// Default: [`SystemNeighbors`], which reads the operating system's ARP
    /// table. Tests substitute [`MockNeighbors`](crate::MockNeighbors).
    pub fn resolver<R: NeighborResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include routing transitions, pairing milestones, binding-check
    /// failures, and per-command failures.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), RelayError> {
        if self.key_store.is_none() {
            return Err(RelayError::KeyStoreMissing);
        }

        // An empty MAC is allowed here; commands fail per-attempt instead.
        // A MAC with no hex digits would normalize to nothing and could
        // never verify, so reject it up front.
        let mac = &self.config.mac_address;
        if !mac.is_empty() && MacAddress::parse(mac).is_none() {
            return Err(RelayError::invalid_config(format!(
                "MAC address {mac:?} contains no hexadecimal digits"
            )));
        }

        Ok(())
    }

    /// Start the relay.
    ///
    /// Returns a [`Relay`] handle that accepts endpoint signals and key
    /// presses. Must be called from within a tokio runtime; television
    /// commands are spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No key store is configured
    /// - The configured MAC address contains no hexadecimal digits
    pub async fn start(self) -> Result<Relay, RelayError> {
        self.validate()?;
        let Some(key_store) = self.key_store else {
            return Err(RelayError::KeyStoreMissing);
        };

        let config = SharedConfig::new(self.config);
        let keys = Arc::new(key_store);

        let engine = Arc::new(RoutingEngine::new(self.host, self.event_callback.clone()));
        let client = Arc::new(TvClient::assemble(
            config.clone(),
            Arc::clone(&keys),
            self.resolver,
            self.event_callback.clone(),
        ));
        let dispatcher = KeyDispatcher::new(
            Arc::clone(&engine),
            Arc::clone(&client),
            tokio::runtime::Handle::current(),
            self.event_callback.clone(),
        );

        Ok(Relay::new(
            config,
            engine,
            client,
            dispatcher,
            self.event_callback,
        ))
    }
}

/// Main entry point for tv-volume-relay.
///
/// Use [`VolumeRelay::builder()`] to start configuring the relay.
pub struct VolumeRelay;

impl VolumeRelay {
    /// Creates a new builder for configuring the relay.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }
}
