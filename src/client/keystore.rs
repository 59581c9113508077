//! Pairing credential persistence.
//!
//! The credential is one opaque string in one plain-text file. Its presence
//! is the entire definition of "paired": commands read it before every
//! attempt, pairing writes it once on success, unpairing deletes it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::TvError;

/// Suffix appended to the configuration file stem for the credential file.
const KEY_FILE_SUFFIX: &str = "_client_key.txt";

/// File-backed store for the television's pairing credential.
///
/// An absent or empty file both mean "not paired". Access serializes on an
/// internal mutex so concurrent command workers never interleave reads with
/// a save or delete.
///
/// # Example
///
/// ```
/// use tv_volume_relay::KeyStore;
///
/// let store = KeyStore::beside("/etc/myapp/settings.ini");
/// assert_eq!(
///     store.path().to_str(),
///     Some("/etc/myapp/settings_client_key.txt")
/// );
/// ```
pub struct KeyStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KeyStore {
    /// Creates a store at the given file path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store co-located with a configuration file: same directory,
    /// same stem, `_client_key.txt` suffix.
    #[must_use]
    pub fn beside(config_path: impl AsRef<Path>) -> Self {
        let config_path = config_path.as_ref();
        let mut file_name = config_path
            .file_stem()
            .map(|stem| stem.to_os_string())
            .unwrap_or_default();
        file_name.push(KEY_FILE_SUFFIX);
        Self::at(config_path.with_file_name(file_name))
    }

    /// Returns the path of the credential file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored credential, if any.
    ///
    /// Only the first line counts and surrounding whitespace is ignored.
    /// Read failures are logged and reported as "no credential" so a broken
    /// file degrades to unpaired instead of wedging the relay.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        let _guard = self.guard();
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("Failed to read client key {}: {}", self.path.display(), err);
                return None;
            }
        };
        let key = contents.lines().next().unwrap_or("").trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    /// Returns `true` if a credential is stored.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.load().is_some()
    }

    /// Persists the credential, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`TvError::KeyStore`] if the file cannot be written.
    pub fn save(&self, key: &str) -> Result<(), TvError> {
        let _guard = self.guard();
        fs::write(&self.path, key).map_err(|err| TvError::key_store(&self.path, err))
    }

    /// Deletes the credential. Deleting when none exists is a success.
    ///
    /// # Errors
    ///
    /// Returns [`TvError::KeyStore`] if an existing file cannot be removed.
    pub fn delete(&self) -> Result<(), TvError> {
        let _guard = self.guard();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TvError::key_store(&self.path, err)),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_absent_file_means_unpaired() {
        let dir = tempdir().unwrap();
        let store = KeyStore::at(dir.path().join("missing_client_key.txt"));
        assert_eq!(store.load(), None);
        assert!(!store.is_paired());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = KeyStore::at(dir.path().join("client_key.txt"));
        store.save("a1b2c3d4").unwrap();
        assert_eq!(store.load().as_deref(), Some("a1b2c3d4"));
        assert!(store.is_paired());
    }

    #[test]
    fn test_empty_file_means_unpaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client_key.txt");
        fs::write(&path, "").unwrap();
        let store = KeyStore::at(&path);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_load_takes_first_line_trimmed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client_key.txt");
        fs::write(&path, "  secret-key  \nleftover junk\n").unwrap();
        let store = KeyStore::at(&path);
        assert_eq!(store.load().as_deref(), Some("secret-key"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = KeyStore::at(dir.path().join("client_key.txt"));
        store.delete().unwrap();
        store.save("key").unwrap();
        store.delete().unwrap();
        store.delete().unwrap();
        assert!(!store.is_paired());
    }

    #[test]
    fn test_beside_uses_config_stem() {
        let store = KeyStore::beside("/opt/app/settings.ini");
        assert_eq!(
            store.path(),
            Path::new("/opt/app/settings_client_key.txt")
        );
    }

    #[test]
    fn test_beside_without_extension() {
        let store = KeyStore::beside("/opt/app/settings");
        assert_eq!(
            store.path(),
            Path::new("/opt/app/settings_client_key.txt")
        );
    }

    #[test]
    fn test_save_overwrites_previous_key() {
        let dir = tempdir().unwrap();
        let store = KeyStore::at(dir.path().join("client_key.txt"));
        store.save("first").unwrap();
        store.save("second").unwrap();
        assert_eq!(store.load().as_deref(), Some("second"));
    }
}
