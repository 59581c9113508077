//! Running relay: endpoint signals and key presses in, television commands out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::TvClient;
use crate::config::SharedConfig;
use crate::dispatch::KeyDispatcher;
use crate::event::emit;
use crate::routing::{RoutingEngine, RoutingInputs};
use crate::{
    device_matches_hint, EndpointSnapshot, EventCallback, KeyDisposition, RelayConfig,
    RelayEvent, TvError, VolumeKey,
};

/// Absolute television volume requested when pairing succeeds, before
/// unpairing, and at shutdown, so key routing starts from a quiet baseline
/// and the television is not left loud once routing stops.
const SAFE_TV_VOLUME: i32 = 10;

/// Point-in-time view of the relay, for status displays.
#[derive(Debug, Clone, Default)]
pub struct RelayStatus {
    /// A pairing credential is stored.
    pub paired: bool,
    /// Volume keys are currently routed to the television.
    pub routing: bool,
    /// The last seen default device matched the configured hint.
    pub device_is_target: bool,
    /// The last seen default device reported spatial audio.
    pub spatial_audio_active: bool,
    /// Friendly name of the last seen default device, if any.
    pub device_name: Option<String>,
}

/// Last observed default-endpoint signals.
#[derive(Default)]
struct EndpointState {
    device_is_target: bool,
    spatial_audio_active: bool,
    friendly_name: Option<String>,
}

/// Handle to a running volume relay.
///
/// The `Relay` is returned by [`RelayBuilder::start()`]. The embedding
/// application feeds it default-device changes and intercepted volume keys;
/// the relay decides routing, pins the host output level while routing is
/// active, and sends television commands in the background.
///
/// # Lifecycle
///
/// 1. Created by [`RelayBuilder::start()`]
/// 2. The application reports endpoint changes and key presses
/// 3. Call [`shutdown()`](Relay::shutdown) for graceful teardown
/// 4. Dropping the `Relay` restores the host level (but prefer explicit
///    `shutdown()`, which also nudges the television to a safe volume)
///
/// # Example
///
/// ```ignore
/// let relay = VolumeRelay::builder()
///     .config(config)
///     .key_store(KeyStore::at("client_key.txt"))
///     .start()
///     .await?;
///
/// relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2 (HDMI)", true)));
///
/// if relay.key_pressed(VolumeKey::Up) == KeyDisposition::PassThrough {
///     // hand the key to the host's own volume handling
/// }
///
/// relay.shutdown().await;
/// ```
///
/// [`RelayBuilder::start()`]: crate::RelayBuilder::start
pub struct Relay {
    config: SharedConfig,
    engine: Arc<RoutingEngine>,
    client: Arc<TvClient>,
    dispatcher: KeyDispatcher,
    endpoint: Mutex<EndpointState>,
    events: Option<EventCallback>,
    active: AtomicBool,
}

impl Relay {
    /// Creates a relay from its assembled parts.
    pub(crate) fn new(
        config: SharedConfig,
        engine: Arc<RoutingEngine>,
        client: Arc<TvClient>,
        dispatcher: KeyDispatcher,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            config,
            engine,
            client,
            dispatcher,
            endpoint: Mutex::new(EndpointState::default()),
            events,
            active: AtomicBool::new(true),
        }
    }

    /// Reports a default playback device change.
    ///
    /// `None` means no default device exists (or it could not be read); both
    /// routing signals drop and routing deactivates. Emits
    /// [`RelayEvent::EndpointChanged`] and recomputes the verdict.
    pub fn endpoint_changed(&self, snapshot: Option<EndpointSnapshot>) {
        let hint = self.config.snapshot().device_hint;
        let (device_is_target, spatial_audio_active, friendly_name) = match snapshot {
            Some(snapshot) => (
                device_matches_hint(&snapshot.friendly_name, &hint),
                snapshot.spatial_audio,
                Some(snapshot.friendly_name),
            ),
            None => (false, false, None),
        };

        {
            let mut endpoint = self.lock_endpoint();
            endpoint.device_is_target = device_is_target;
            endpoint.spatial_audio_active = spatial_audio_active;
            endpoint.friendly_name = friendly_name.clone();
        }

        tracing::debug!(
            "Endpoint changed: device {:?}, target {}, spatial audio {}",
            friendly_name,
            device_is_target,
            spatial_audio_active
        );
        emit(
            self.events.as_ref(),
            RelayEvent::EndpointChanged {
                device_name: friendly_name,
                device_is_target,
                spatial_audio_active,
            },
        );
        self.recompute();
    }

    /// Decides one intercepted volume key. Synchronous and non-blocking.
    pub fn key_pressed(&self, key: VolumeKey) -> KeyDisposition {
        self.dispatcher.dispatch(key)
    }

    /// Pairs with the television, then folds the new credential into the
    /// routing verdict.
    ///
    /// On success the television is first nudged to a safe volume,
    /// best-effort, so routing starts from a quiet baseline.
    ///
    /// # Errors
    ///
    /// Returns a [`TvError`] when the binding check, the transport, or the
    /// pairing exchange fails.
    pub async fn pair(&self) -> Result<(), TvError> {
        self.client.pair().await?;
        if let Err(err) = self.client.set_volume(SAFE_TV_VOLUME).await {
            tracing::debug!("Safe-volume nudge after pairing failed: {}", err);
        }
        self.recompute();
        Ok(())
    }

    /// Discards the stored pairing credential.
    ///
    /// While still paired the television is first nudged to a safe volume,
    /// best-effort; after unpairing no command can reach it. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`TvError`] when deleting the stored key fails.
    pub async fn unpair(&self) -> Result<(), TvError> {
        if self.client.is_paired() {
            if let Err(err) = self.client.set_volume(SAFE_TV_VOLUME).await {
                tracing::debug!("Safe-volume nudge before unpairing failed: {}", err);
            }
        }
        self.client.unpair()?;
        self.recompute();
        Ok(())
    }

    /// Sets the absolute television volume (0 to 100).
    ///
    /// # Errors
    ///
    /// Returns a [`TvError`] when unpaired, when the binding check fails, or
    /// on a transport failure.
    pub async fn set_volume(&self, percent: i32) -> Result<(), TvError> {
        self.client.set_volume(percent).await
    }

    /// Sets the television mute state.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`set_volume`](Self::set_volume).
    pub async fn set_mute(&self, mute: bool) -> Result<(), TvError> {
        self.client.set_mute(mute).await
    }

    /// Replaces the configuration.
    ///
    /// The hint match is re-derived from the device last seen, so a hint
    /// edit takes effect without waiting for the next device change. The
    /// binding check notices an address or MAC edit on the next command.
    pub fn update_config(&self, config: RelayConfig) {
        self.config.store(config.clone());
        {
            let mut endpoint = self.lock_endpoint();
            endpoint.device_is_target = endpoint
                .friendly_name
                .as_deref()
                .is_some_and(|name| device_matches_hint(name, &config.device_hint));
        }
        tracing::info!(
            "Configuration updated; television address {:?}",
            config.address
        );
        self.recompute();
    }

    /// Returns `true` while volume keys are routed to the television.
    pub fn routing(&self) -> bool {
        self.engine.routing()
    }

    /// Returns `true` while a pairing credential is stored.
    pub fn is_paired(&self) -> bool {
        self.client.is_paired()
    }

    /// Returns a snapshot of the relay state.
    pub fn status(&self) -> RelayStatus {
        let endpoint = self.lock_endpoint();
        RelayStatus {
            paired: self.client.is_paired(),
            routing: self.engine.routing(),
            device_is_target: endpoint.device_is_target,
            spatial_audio_active: endpoint.spatial_audio_active,
            device_name: endpoint.friendly_name.clone(),
        }
    }

    /// Gracefully shuts the relay down.
    ///
    /// While paired the television is nudged to a safe volume, best-effort;
    /// then the saved host level is restored. In-flight commands already
    /// spawned are left to finish on their own.
    pub async fn shutdown(self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.client.is_paired() {
            if let Err(err) = self.client.set_volume(SAFE_TV_VOLUME).await {
                tracing::debug!("Safe-volume nudge at shutdown failed: {}", err);
            }
        }
        self.engine.deactivate();
        tracing::info!("Relay shut down");
    }

    /// Recomputes the routing verdict from the stored endpoint signals, the
    /// live configuration, and the pairing state.
    fn recompute(&self) -> bool {
        let config = self.config.snapshot();
        let (device_is_target, spatial_audio_active) = {
            let endpoint = self.lock_endpoint();
            (endpoint.device_is_target, endpoint.spatial_audio_active)
        };
        self.engine.recompute(RoutingInputs {
            device_is_target,
            spatial_audio_active,
            has_credential: self.client.is_paired(),
            only_when_atmos: config.only_when_atmos,
        })
    }

    fn lock_endpoint(&self) -> MutexGuard<'_, EndpointState> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            // No runtime is guaranteed here, so the television is left
            // alone; only the host level is restored.
            self.engine.deactivate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        KeyStore, MacAddress, MockHostVolume, MockNeighbors, RelayConfig, VolumeRelay,
    };
    use std::sync::Mutex;
    use tempfile::tempdir;

    const TV_MAC: &str = "AA:BB:CC:DD:EE:FF";

    /// A relay paired out of band, talking to an address nothing listens on.
    /// Commands fail fast with a refused connection, which the safe-volume
    /// nudge paths ignore.
    async fn paired_relay(
        dir: &tempfile::TempDir,
        host: MockHostVolume,
        events: Option<Arc<Mutex<Vec<RelayEvent>>>>,
    ) -> Relay {
        let key_path = dir.path().join("client_key.txt");
        std::fs::write(&key_path, "key-from-earlier-pairing\n").unwrap();

        let mut builder = VolumeRelay::builder()
            .config(RelayConfig {
                address: "127.0.0.1".into(),
                mac_address: TV_MAC.into(),
                port: 1,
                secure: false,
                ..RelayConfig::default()
            })
            .host_volume(host)
            .key_store(KeyStore::at(key_path))
            .resolver(MockNeighbors::answering(
                MacAddress::parse(TV_MAC).unwrap(),
            ));
        if let Some(seen) = events {
            builder = builder.on_event(move |event| seen.lock().unwrap().push(event));
        }
        builder.start().await.unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_changed_activates_and_deactivates_routing() {
        let dir = tempdir().unwrap();
        let host = MockHostVolume::new(0.4);
        let relay = paired_relay(&dir, host.clone(), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        assert!(relay.routing());
        assert_eq!(host.set_calls(), vec![1.0]);

        relay.endpoint_changed(None);
        assert!(!relay.routing());
        assert_eq!(host.set_calls(), vec![1.0, 0.4]);
    }

    #[tokio::test]
    async fn test_endpoint_none_clears_status_signals() {
        let dir = tempdir().unwrap();
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        relay.endpoint_changed(None);

        let status = relay.status();
        assert!(!status.device_is_target);
        assert!(!status.spatial_audio_active);
        assert_eq!(status.device_name, None);
    }

    #[tokio::test]
    async fn test_non_spatial_endpoint_does_not_route_by_default() {
        let dir = tempdir().unwrap();
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", false)));
        assert!(!relay.routing());

        let status = relay.status();
        assert!(status.device_is_target);
        assert!(!status.spatial_audio_active);
    }

    #[tokio::test]
    async fn test_update_config_rematches_last_seen_device() {
        let dir = tempdir().unwrap();
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        assert!(relay.routing());

        // Pointing the hint at a different brand must drop routing without
        // another endpoint change.
        let mut config = relay.config.snapshot();
        config.device_hint = "SONY".into();
        relay.update_config(config);

        assert!(!relay.routing());
        assert!(!relay.status().device_is_target);
    }

    #[tokio::test]
    async fn test_update_config_atmos_preference_applies_immediately() {
        let dir = tempdir().unwrap();
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", false)));
        assert!(!relay.routing());

        let mut config = relay.config.snapshot();
        config.only_when_atmos = false;
        relay.update_config(config);

        assert!(relay.routing());
    }

    #[tokio::test]
    async fn test_unpair_drops_routing() {
        let dir = tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), Some(events.clone())).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        assert!(relay.routing());

        relay.unpair().await.unwrap();
        assert!(!relay.is_paired());
        assert!(!relay.routing());
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, RelayEvent::Unpaired)));
    }

    #[tokio::test]
    async fn test_unpair_when_not_paired_is_a_no_op() {
        let dir = tempdir().unwrap();
        let relay = VolumeRelay::builder()
            .key_store(KeyStore::at(dir.path().join("client_key.txt")))
            .start()
            .await
            .unwrap();

        relay.unpair().await.unwrap();
        assert!(!relay.is_paired());
    }

    #[tokio::test]
    async fn test_status_reflects_endpoint_and_pairing() {
        let dir = tempdir().unwrap();
        let relay = paired_relay(&dir, MockHostVolume::new(0.4), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));

        let status = relay.status();
        assert!(status.paired);
        assert!(status.routing);
        assert!(status.device_is_target);
        assert!(status.spatial_audio_active);
        assert_eq!(status.device_name.as_deref(), Some("LG TV SSCR2"));
    }

    #[tokio::test]
    async fn test_shutdown_restores_host_level() {
        let dir = tempdir().unwrap();
        let host = MockHostVolume::new(0.4);
        let relay = paired_relay(&dir, host.clone(), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        assert_eq!(host.set_calls(), vec![1.0]);

        relay.shutdown().await;
        assert_eq!(host.set_calls(), vec![1.0, 0.4]);
    }

    #[tokio::test]
    async fn test_drop_restores_host_level() {
        let dir = tempdir().unwrap();
        let host = MockHostVolume::new(0.4);
        let relay = paired_relay(&dir, host.clone(), None).await;

        relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true)));
        drop(relay);

        assert_eq!(host.set_calls(), vec![1.0, 0.4]);
    }
}
