//! Default playback device signals.
//!
//! The platform watcher that observes default-device changes lives in the
//! embedding application (audio device enumeration is platform API, like the
//! volume seam in [`host`](crate::host)). This module defines the snapshot it
//! feeds into [`Relay::endpoint_changed`](crate::Relay::endpoint_changed) and
//! the name-matching rule the routing verdict applies to it.

/// What the device watcher saw when the default playback device changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSnapshot {
    /// Friendly name of the default playback device.
    pub friendly_name: String,

    /// Whether the device reported the spatial audio (Dolby Atmos) format
    /// as available at the time of the change.
    pub spatial_audio: bool,
}

impl EndpointSnapshot {
    /// Creates a snapshot for the given device name.
    #[must_use]
    pub fn new(friendly_name: impl Into<String>, spatial_audio: bool) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            spatial_audio,
        }
    }
}

/// Decides whether a device friendly name identifies the television.
///
/// The hint matches as a case-insensitive substring. An empty hint matches
/// nothing, so a blank configuration never captures the volume keys.
///
/// # Example
///
/// ```
/// use tv_volume_relay::device_matches_hint;
///
/// assert!(device_matches_hint("LG TV SSCR2 (NVIDIA High Definition Audio)", "LG"));
/// assert!(device_matches_hint("lg tv", "LG"));
/// assert!(!device_matches_hint("Speakers (Realtek Audio)", "LG"));
/// assert!(!device_matches_hint("LG TV", ""));
/// ```
#[must_use]
pub fn device_matches_hint(friendly_name: &str, hint: &str) -> bool {
    if hint.is_empty() {
        return false;
    }
    friendly_name
        .to_lowercase()
        .contains(&hint.to_lowercase())
}
