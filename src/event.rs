//! Runtime events for observing relay behavior.
//!
//! Events are non-fatal notifications about what the relay is doing. The
//! session keeps running after every event - they exist so an embedding
//! application can drive status displays, tray notifications, or pairing
//! prompts without polling.

use std::sync::Arc;

/// Runtime events emitted by a relay session.
///
/// These are informational, not errors. The session continues running after
/// any event is emitted. Use the [`EventCallback`] to update status text or
/// prompt the user.
///
/// # Example
///
/// ```
/// use tv_volume_relay::RelayEvent;
///
/// fn handle_event(event: RelayEvent) {
///     match event {
///         RelayEvent::PairingPrompt => {
///             eprintln!("Check the TV screen and accept the pairing request");
///         }
///         RelayEvent::BindingMismatch { expected, resolved } => {
///             eprintln!("Wrong device? expected MAC {expected}, found {resolved}");
///         }
///         RelayEvent::CommandFailed { action, reason } => {
///             eprintln!("TV command {action} failed: {reason}");
///         }
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Routing turned on: volume keys now command the television.
    ///
    /// The host level was snapshotted and forced to full scale.
    RoutingActivated {
        /// The host level that was saved and will be restored later.
        saved_level: f32,
    },

    /// Routing turned off: volume keys control the host again.
    RoutingDeactivated {
        /// The host level that was restored from the snapshot.
        restored_level: f32,
    },

    /// The default playback device changed (or disappeared).
    EndpointChanged {
        /// Friendly name of the new device, if one was found.
        device_name: Option<String>,
        /// Whether the device name matched the configured hint.
        device_is_target: bool,
        /// Whether the device reported spatial audio availability.
        spatial_audio_active: bool,
    },

    /// Pairing has been requested on the television; the user must accept
    /// the on-screen prompt for pairing to complete.
    PairingPrompt,

    /// Pairing completed and a client key was stored.
    Paired,

    /// The stored client key was deleted.
    Unpaired,

    /// The device answering at the configured address has a different MAC
    /// than expected. No command was sent to it.
    BindingMismatch {
        /// The MAC address the configuration expects.
        expected: String,
        /// The MAC address actually resolved.
        resolved: String,
    },

    /// No MAC address could be resolved for the configured address, so the
    /// device identity could not be confirmed and no command was sent.
    BindingUnresolved {
        /// The configured television address.
        address: String,
        /// Why resolution failed.
        reason: String,
    },

    /// An asynchronous television command failed.
    ///
    /// The key press that triggered it was still claimed; failures here are
    /// diagnostics, not something the key path waits for.
    CommandFailed {
        /// The action that failed, e.g. `volumeUp`.
        action: String,
        /// Description of the failure.
        reason: String,
    },

    /// Reading or writing the host endpoint level failed.
    ///
    /// The routing verdict is unaffected; the level side effect was skipped.
    HostLevelError {
        /// Which operation failed (`"read"` or `"set"`).
        operation: &'static str,
        /// Description of the failure.
        error: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`RelayBuilder::on_event()`] to receive
/// notifications about routing flips, pairing progress, and command
/// failures.
///
/// [`RelayBuilder::on_event()`]: crate::RelayBuilder::on_event
///
/// # Example
///
/// ```ignore
/// use tv_volume_relay::VolumeRelay;
///
/// let relay = VolumeRelay::builder()
///     .on_event(|event| {
///         tracing::info!("Relay event: {:?}", event);
///     })
///     .start()
///     .await?;
/// ```
pub type EventCallback = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// This is a convenience function for creating event callbacks without
/// manually wrapping in `Arc`.
///
/// # Example
///
/// ```
/// use tv_volume_relay::{event_callback, RelayEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RelayEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invokes the callback if one is registered.
pub(crate) fn emit(events: Option<&EventCallback>, event: RelayEvent) {
    if let Some(callback) = events {
        callback(event);
    }
}
