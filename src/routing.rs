//! Routing verdict and host level transitions.
//!
//! The engine fuses three live signals (device identity, spatial audio,
//! pairing) and one preference flag into a single boolean verdict: do volume
//! keys command the television right now. Around verdict flips it manages
//! the host endpoint level so the local signal path stays deterministic:
//!
//! ```text
//!   verdict off -> on    snapshot host level, force it to full scale
//!   verdict on  -> off   restore the snapshot
//!   no flip              touch nothing
//! ```
//!
//! Recomputation can arrive from any thread that observes device or
//! configuration changes, so the mutable pair (verdict, snapshot) lives
//! behind one mutex; the verdict is mirrored into an atomic for the
//! key-interception path, which must decide without blocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::{emit, EventCallback, RelayEvent};
use crate::HostVolume;

/// Level forced on the host endpoint while routing is active.
const FULL_SCALE: f32 = 1.0;

/// Snapshot used if routing deactivates before a level was ever read.
const DEFAULT_SAVED_LEVEL: f32 = 0.25;

/// One recomputation's worth of verdict inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RoutingInputs {
    /// The default playback device matched the configured hint.
    pub device_is_target: bool,
    /// The device reported spatial audio availability.
    pub spatial_audio_active: bool,
    /// A pairing credential is stored.
    pub has_credential: bool,
    /// Preference: only route while spatial audio is active.
    pub only_when_atmos: bool,
}

impl RoutingInputs {
    /// The routing predicate. Pure; pairing is a hard gate.
    pub fn verdict(&self) -> bool {
        let candidate =
            self.device_is_target && (!self.only_when_atmos || self.spatial_audio_active);
        candidate && self.has_credential
    }
}

struct LevelState {
    routing: bool,
    saved_level: f32,
}

/// Owns the routing verdict and the host level snapshot.
pub(crate) struct RoutingEngine {
    state: Mutex<LevelState>,
    /// Mirror of `state.routing` for lock-free reads on the key path.
    routing_flag: AtomicBool,
    host: Option<Arc<dyn HostVolume>>,
    events: Option<EventCallback>,
}

impl RoutingEngine {
    pub fn new(host: Option<Arc<dyn HostVolume>>, events: Option<EventCallback>) -> Self {
        Self {
            state: Mutex::new(LevelState {
                routing: false,
                saved_level: DEFAULT_SAVED_LEVEL,
            }),
            routing_flag: AtomicBool::new(false),
            host,
            events,
        }
    }

    /// Returns the current verdict without taking the lock.
    pub fn routing(&self) -> bool {
        self.routing_flag.load(Ordering::SeqCst)
    }

    /// Recomputes the verdict and performs level transitions on a flip.
    ///
    /// Identical inputs are a no-op on the host level. Level I/O failures
    /// are logged and surfaced as events but never change the verdict.
    pub fn recompute(&self, inputs: RoutingInputs) -> bool {
        let verdict = inputs.verdict();
        let mut pending: Vec<RelayEvent> = Vec::new();
        {
            let mut state = self.lock();
            if verdict == state.routing {
                return verdict;
            }
            if verdict {
                // On read failure the previous snapshot stays in place.
                if let Some(level) = self.read_host_level(&mut pending) {
                    state.saved_level = level;
                }
                self.write_host_level(FULL_SCALE, &mut pending);
                state.routing = true;
                self.routing_flag.store(true, Ordering::SeqCst);
                tracing::info!(
                    "Routing volume keys to the television (saved host level {:.2})",
                    state.saved_level
                );
                pending.push(RelayEvent::RoutingActivated {
                    saved_level: state.saved_level,
                });
            } else {
                self.write_host_level(state.saved_level, &mut pending);
                state.routing = false;
                self.routing_flag.store(false, Ordering::SeqCst);
                tracing::info!(
                    "Volume keys back to the host (restored level {:.2})",
                    state.saved_level
                );
                pending.push(RelayEvent::RoutingDeactivated {
                    restored_level: state.saved_level,
                });
            }
        }
        for event in pending {
            emit(self.events.as_ref(), event);
        }
        verdict
    }

    /// Re-forces the host level to full scale while routing is active.
    ///
    /// Called on every claimed key press so the host level cannot drift
    /// away from full scale mid-session. Best effort; failures are logged
    /// at debug only.
    pub fn pin_full(&self) {
        let state = self.lock();
        if !state.routing {
            return;
        }
        if let Some(host) = self.host.as_ref() {
            if let Err(err) = host.set_level(FULL_SCALE) {
                tracing::debug!("Failed to pin host level to full scale: {}", err);
            }
        }
    }

    /// Forces routing off and restores the snapshot. Shutdown path.
    pub fn deactivate(&self) {
        let mut pending: Vec<RelayEvent> = Vec::new();
        {
            let mut state = self.lock();
            if !state.routing {
                return;
            }
            self.write_host_level(state.saved_level, &mut pending);
            state.routing = false;
            self.routing_flag.store(false, Ordering::SeqCst);
            tracing::info!(
                "Routing stopped; restored host level {:.2}",
                state.saved_level
            );
            pending.push(RelayEvent::RoutingDeactivated {
                restored_level: state.saved_level,
            });
        }
        for event in pending {
            emit(self.events.as_ref(), event);
        }
    }

    fn read_host_level(&self, pending: &mut Vec<RelayEvent>) -> Option<f32> {
        let host = self.host.as_ref()?;
        match host.level() {
            Ok(level) => Some(level),
            Err(err) => {
                tracing::warn!("Failed to read host level: {}", err);
                pending.push(RelayEvent::HostLevelError {
                    operation: "read",
                    error: err.to_string(),
                });
                None
            }
        }
    }

    fn write_host_level(&self, level: f32, pending: &mut Vec<RelayEvent>) {
        let Some(host) = self.host.as_ref() else {
            tracing::debug!("No host volume access; skipping level write");
            return;
        };
        if let Err(err) = host.set_level(level) {
            tracing::warn!("Failed to set host level to {:.2}: {}", level, err);
            pending.push(RelayEvent::HostLevelError {
                operation: "set",
                error: err.to_string(),
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, LevelState> {
        // Never poison-panic: a failed level write elsewhere must not take
        // the whole relay down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
