//! Error types for tv-volume-relay.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`RelayError`]): Prevent the relay from starting
//! - **Per-attempt errors** ([`TvError`]): One television command or pairing
//!   attempt failed; the next attempt is independent and no retry happens
//!   within a call

use std::path::PathBuf;

/// Fatal errors that prevent a relay session from starting.
///
/// These errors are returned from [`RelayBuilder::start()`] and indicate the
/// session cannot be created. Runtime issues (command failures, binding
/// mismatches, host level I/O) are surfaced via the event callback and
/// [`TvError`] instead.
///
/// [`RelayBuilder::start()`]: crate::RelayBuilder::start
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No credential store was configured before starting.
    #[error("no key store configured - use key_store() to say where the pairing credential lives")]
    KeyStoreMissing,

    /// The configuration cannot work as written.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl RelayError {
    /// Creates an invalid-configuration error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors from a single television command or pairing attempt.
///
/// Every attempt opens its own connection, so these are recoverable by
/// definition - the next key press or pairing retry starts clean. The
/// variants keep the failure classes distinguishable (configuration, binding,
/// transport, protocol, credential store) even though the key dispatcher only
/// cares about pass/fail.
#[derive(Debug, thiserror::Error)]
pub enum TvError {
    /// No television address is configured.
    #[error("television address is not configured")]
    AddressMissing,

    /// No expected MAC address is configured.
    #[error("television MAC address is not configured")]
    MacMissing,

    /// No pairing credential is stored; pair with the television first.
    #[error("not paired with the television (no client key stored)")]
    NotPaired,

    /// The device answering at the configured address has a different MAC
    /// than configured. The command was not sent.
    #[error("device at {address} has MAC {resolved}, expected {expected}")]
    BindingMismatch {
        /// The configured television address.
        address: String,
        /// The MAC address the configuration expects.
        expected: String,
        /// The MAC address actually resolved for the address.
        resolved: String,
    },

    /// No MAC address could be resolved for the configured address.
    #[error("could not resolve a MAC address for {address}: {reason}")]
    BindingUnresolved {
        /// The configured television address.
        address: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The WebSocket connection could not be established.
    #[error("connection to {url} failed: {reason}")]
    Connect {
        /// The URL that was dialed.
        url: String,
        /// Why the connection failed.
        reason: String,
    },

    /// The server answered the upgrade request with a non-101 status.
    #[error("websocket upgrade rejected with HTTP status {status}")]
    Upgrade {
        /// The HTTP status the server returned.
        status: u16,
    },

    /// Sending a frame failed.
    #[error("send failed: {reason}")]
    Send {
        /// Why the send failed.
        reason: String,
    },

    /// Receiving a frame failed or timed out.
    #[error("receive failed: {reason}")]
    Receive {
        /// Why the receive failed.
        reason: String,
    },

    /// The television closed the connection mid-exchange.
    #[error("the television closed the connection")]
    ConnectionClosed,

    /// Pairing ran out of response frames without finding a client key.
    ///
    /// Distinct from transport failure: the user should retry the on-screen
    /// prompt rather than check connectivity.
    #[error("pairing finished without a client key (scanned {frames} frames)")]
    PairingNoKey {
        /// How many frames were scanned.
        frames: usize,
    },

    /// Reading, writing, or deleting the credential file failed.
    #[error("client key store {}: {source}", .path.display())]
    KeyStore {
        /// Path of the credential file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TvError {
    /// Creates a connect error for the given URL.
    pub fn connect(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a send error with the given reason.
    pub fn send(reason: impl Into<String>) -> Self {
        Self::Send {
            reason: reason.into(),
        }
    }

    /// Creates a receive error with the given reason.
    pub fn receive(reason: impl Into<String>) -> Self {
        Self::Receive {
            reason: reason.into(),
        }
    }

    /// Creates an unresolved-binding error for the given address.
    pub fn binding_unresolved(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindingUnresolved {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates a credential-store error for the given path.
    pub fn key_store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::KeyStore {
            path: path.into(),
            source,
        }
    }
}

/// Failure to resolve a neighbor's MAC address.
///
/// Returned by [`NeighborResolver`](crate::NeighborResolver) implementations;
/// the binding verifier reduces it to [`TvError::BindingUnresolved`].
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct ResolveError {
    reason: String,
}

impl ResolveError {
    /// Creates a resolve error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure reading or writing the host endpoint's audio level.
///
/// Host level access is advisory: the routing engine logs these and keeps
/// going, so implementations of [`HostVolume`](crate::HostVolume) reduce
/// whatever their platform reports to a message string.
#[derive(Debug, thiserror::Error)]
#[error("host volume: {message}")]
pub struct HostVolumeError {
    message: String,
}

impl HostVolumeError {
    /// Creates a host volume error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
