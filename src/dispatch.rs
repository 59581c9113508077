//! Volume key interception boundary.
//!
//! The key hook that feeds this module is synchronous and time-bounded: the
//! platform will drop a misbehaving hook that stalls. The dispatcher
//! therefore decides claim-or-pass from an atomic verdict read, pins the
//! host level, and hands the actual television command to the runtime.
//! Nothing here awaits network I/O.
//!
//! Claiming is unconditional once routing is active. Even if the command
//! later fails, the local volume overlay must not flash for a key the
//! television owns, so the decision never waits on the outcome.

use std::sync::Arc;

use crate::event::{emit, EventCallback, RelayEvent};
use crate::routing::RoutingEngine;
use crate::TvClient;

/// A volume-related key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKey {
    /// Volume step up.
    Up,
    /// Volume step down.
    Down,
    /// Mute toggle.
    Mute,
}

impl VolumeKey {
    /// Short action label used in logs and events.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Up => "volumeUp",
            Self::Down => "volumeDown",
            Self::Mute => "toggleMute",
        }
    }
}

/// What the key hook should do with an intercepted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// Suppress the key; a television command was dispatched for it.
    Claimed,
    /// Hand the key to the host's default volume handling.
    PassThrough,
}

/// Turns key presses into television commands while routing is active.
pub(crate) struct KeyDispatcher {
    engine: Arc<RoutingEngine>,
    client: Arc<TvClient>,
    runtime: tokio::runtime::Handle,
    events: Option<EventCallback>,
}

impl KeyDispatcher {
    pub fn new(
        engine: Arc<RoutingEngine>,
        client: Arc<TvClient>,
        runtime: tokio::runtime::Handle,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            engine,
            client,
            runtime,
            events,
        }
    }

    /// Decides one key press. Synchronous and non-blocking.
    ///
    /// Commands are fire-and-forget: a second key press while the first is
    /// still in flight runs concurrently rather than queueing.
    pub fn dispatch(&self, key: VolumeKey) -> KeyDisposition {
        if !self.engine.routing() {
            return KeyDisposition::PassThrough;
        }

        self.engine.pin_full();
        tracing::debug!("Key {:?} claimed; dispatching {}", key, key.action());

        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = match key {
                VolumeKey::Up => client.volume_up().await,
                VolumeKey::Down => client.volume_down().await,
                VolumeKey::Mute => client.toggle_mute().await,
            };
            if let Err(err) = result {
                tracing::debug!("Television command {} failed: {}", key.action(), err);
                emit(
                    events.as_ref(),
                    RelayEvent::CommandFailed {
                        action: key.action().to_string(),
                        reason: err.to_string(),
                    },
                );
            }
        });
        KeyDisposition::Claimed
    }
}
