//! Host endpoint volume seam.
//!
//! The routing engine snapshots, forces, and restores the host playback
//! device's master level around routing transitions. How that level is
//! actually read and written is platform territory, so it sits behind the
//! [`HostVolume`] trait and the embedding application supplies the
//! implementation for its platform mixer API.

use std::sync::{Arc, Mutex, PoisonError};

use crate::HostVolumeError;

/// Access to the host playback endpoint's master volume scalar.
///
/// Levels are in the 0.0 to 1.0 range. Implementations are called from the
/// routing engine under its own lock, so they only need `Send + Sync`, not
/// internal serialization against the engine.
///
/// Failures are advisory: the engine logs them and continues, so reduce
/// platform errors to a message via [`HostVolumeError::new`].
///
/// # Example
///
/// ```
/// use tv_volume_relay::{HostVolume, HostVolumeError};
///
/// struct FixedVolume;
///
/// impl HostVolume for FixedVolume {
///     fn level(&self) -> Result<f32, HostVolumeError> {
///         Ok(0.5)
///     }
///
///     fn set_level(&self, _level: f32) -> Result<(), HostVolumeError> {
///         Err(HostVolumeError::new("read-only endpoint"))
///     }
/// }
/// ```
pub trait HostVolume: Send + Sync {
    /// Reads the current master level scalar.
    fn level(&self) -> Result<f32, HostVolumeError>;

    /// Sets the master level scalar.
    fn set_level(&self, level: f32) -> Result<(), HostVolumeError>;
}

/// An in-memory [`HostVolume`] for testing without a real audio endpoint.
///
/// Clones share state, so tests can hand one clone to the relay and keep
/// another to inspect what happened.
///
/// # Example
///
/// ```
/// use tv_volume_relay::{HostVolume, MockHostVolume};
///
/// let mock = MockHostVolume::new(0.4);
/// mock.set_level(1.0).unwrap();
/// assert_eq!(mock.current_level(), 1.0);
/// assert_eq!(mock.set_calls(), vec![1.0]);
/// ```
#[derive(Clone)]
pub struct MockHostVolume {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    level: f32,
    set_calls: Vec<f32>,
    reads: u32,
    fail_reads: bool,
    fail_sets: bool,
}

impl MockHostVolume {
    /// Creates a mock endpoint at the given starting level.
    #[must_use]
    pub fn new(level: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                level,
                set_calls: Vec::new(),
                reads: 0,
                fail_reads: false,
                fail_sets: false,
            })),
        }
    }

    /// Returns the level the mock currently holds.
    #[must_use]
    pub fn current_level(&self) -> f32 {
        self.lock().level
    }

    /// Returns every level passed to [`HostVolume::set_level`], in order.
    #[must_use]
    pub fn set_calls(&self) -> Vec<f32> {
        self.lock().set_calls.clone()
    }

    /// Returns how many times the level was read.
    #[must_use]
    pub fn read_count(&self) -> u32 {
        self.lock().reads
    }

    /// Makes subsequent reads fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn fail_sets(&self, fail: bool) {
        self.lock().fail_sets = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-call; carry on.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostVolume for MockHostVolume {
    fn level(&self) -> Result<f32, HostVolumeError> {
        let mut state = self.lock();
        state.reads += 1;
        if state.fail_reads {
            return Err(HostVolumeError::new("mock read failure"));
        }
        Ok(state.level)
    }

    fn set_level(&self, level: f32) -> Result<(), HostVolumeError> {
        let mut state = self.lock();
        state.set_calls.push(level);
        if state.fail_sets {
            return Err(HostVolumeError::new("mock write failure"));
        }
        state.level = level;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_set_and_read() {
        let mock = MockHostVolume::new(0.3);
        assert_eq!(mock.level().unwrap(), 0.3);
        mock.set_level(0.8).unwrap();
        assert_eq!(mock.level().unwrap(), 0.8);
        assert_eq!(mock.read_count(), 2);
    }

    #[test]
    fn test_mock_records_set_calls() {
        let mock = MockHostVolume::new(0.5);
        mock.set_level(1.0).unwrap();
        mock.set_level(0.5).unwrap();
        assert_eq!(mock.set_calls(), vec![1.0, 0.5]);
    }

    #[test]
    fn test_mock_read_failure() {
        let mock = MockHostVolume::new(0.5);
        mock.fail_reads(true);
        assert!(mock.level().is_err());
        mock.fail_reads(false);
        assert_eq!(mock.level().unwrap(), 0.5);
    }

    #[test]
    fn test_mock_write_failure_keeps_level() {
        let mock = MockHostVolume::new(0.5);
        mock.fail_sets(true);
        assert!(mock.set_level(0.9).is_err());
        assert_eq!(mock.current_level(), 0.5);
        // Failed attempts still show up in the call history.
        assert_eq!(mock.set_calls(), vec![0.9]);
    }

    #[test]
    fn test_clones_share_state() {
        let mock = MockHostVolume::new(0.2);
        let clone = mock.clone();
        clone.set_level(0.7).unwrap();
        assert_eq!(mock.current_level(), 0.7);
    }
}
