//! # tv-volume-relay
//!
//! Volume-key routing for televisions that speak the SSAP WebSocket
//! protocol (LG webOS).
//!
//! When the host's default playback device is the television, the relay
//! claims the host's volume keys and forwards each press as a television
//! command over a short-lived WebSocket session, pinning the host output
//! level at full scale so the host's own attenuation stays out of the
//! signal path. When the default device moves elsewhere, the keys fall
//! through to the host and the saved level is restored.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tv_volume_relay::{
//!     EndpointSnapshot, KeyDisposition, KeyStore, RelayConfig, VolumeKey, VolumeRelay,
//! };
//!
//! let relay = VolumeRelay::builder()
//!     .config(RelayConfig {
//!         address: "192.168.1.34".into(),
//!         mac_address: "AA:BB:CC:DD:EE:FF".into(),
//!         ..RelayConfig::default()
//!     })
//!     .key_store(KeyStore::at("client_key.txt"))
//!     .on_event(|event| tracing::info!("Relay event: {:?}", event))
//!     .start()
//!     .await?;
//!
//! // One-time: approve the pairing prompt on the television.
//! relay.pair().await?;
//!
//! // From the platform's device watcher:
//! relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2 (HDMI)", true)));
//!
//! // From the platform's key hook:
//! match relay.key_pressed(VolumeKey::Up) {
//!     KeyDisposition::Claimed => {}     // swallow the key press
//!     KeyDisposition::PassThrough => {} // let the host handle it
//! }
//!
//! relay.shutdown().await;
//! ```
//!
//! ## Architecture
//!
//! The crate keeps a strict boundary between deciding and doing:
//!
//! - **Key path**: [`Relay::key_pressed`] reads one atomic and returns;
//!   television commands are spawned onto the tokio runtime, fire-and-forget
//! - **Routing engine**: the verdict and the saved host level live behind a
//!   single mutex, recomputed on every endpoint, pairing, or config change
//! - **Protocol client**: one WebSocket session per command (register, ack,
//!   request, close); never a persistent connection, never a retry
//!
//! Platform seams stay outside the crate: the mixer behind the
//! [`HostVolume`] trait, the device watcher behind [`EndpointSnapshot`]
//! reports, and the key hook behind [`Relay::key_pressed`].

#![warn(missing_docs)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod client;
mod config;
mod dispatch;
mod error;
mod event;
mod host;
mod monitor;
mod routing;
mod session;

pub use builder::{RelayBuilder, VolumeRelay};
pub use client::{
    KeyStore, MacAddress, MockNeighbors, NeighborResolver, SystemNeighbors, TvClient,
};
pub use config::RelayConfig;
pub use dispatch::{KeyDisposition, VolumeKey};
pub use error::{HostVolumeError, RelayError, ResolveError, TvError};
pub use event::{event_callback, EventCallback, RelayEvent};
pub use host::{HostVolume, MockHostVolume};
pub use monitor::{device_matches_hint, EndpointSnapshot};
pub use session::{Relay, RelayStatus};
