//! Device identity verification.
//!
//! An IP address is a weak identity on a home network: DHCP can hand the
//! television's old address to anything. Before every connection the client
//! therefore resolves the MAC address currently answering at the configured
//! address and compares it with the configured expectation. A mismatch or a
//! failed resolution fails the attempt closed; no frame is ever sent to an
//! unverified device.
//!
//! The verdict for a given (address, MAC) configuration pair is memoized so
//! routine key presses do not hammer the neighbor table. Editing either half
//! of the pair invalidates the memo by key comparison; nothing expires on a
//! timer.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::event::{emit, EventCallback, RelayEvent};
use crate::{ResolveError, TvError};

/// A MAC address held in canonical comparison form.
///
/// Canonical form is the uppercase hexadecimal digits with every separator
/// removed, so `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` and `aabbccddeeff`
/// all compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parses a MAC address from any common textual form.
    ///
    /// Returns `None` when nothing hexadecimal is left after stripping
    /// separators.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = Self::normalize(raw);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Builds a MAC address from raw hardware bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes.iter().map(|byte| format!("{byte:02X}")).collect())
    }

    /// Returns the canonical form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reduces a raw string to canonical form (possibly empty).
    pub(crate) fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves which MAC address currently answers at an IPv4 address.
///
/// The relay ships [`SystemNeighbors`] for Linux hosts and [`MockNeighbors`]
/// for tests; other platforms inject their own implementation.
#[async_trait]
pub trait NeighborResolver: Send + Sync {
    /// Resolves the MAC address for `address`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when no neighbor entry can be obtained.
    async fn resolve(&self, address: Ipv4Addr) -> Result<MacAddress, ResolveError>;
}

/// Destination port for the probe datagram (the discard service).
#[cfg(target_os = "linux")]
const PROBE_PORT: u16 = 9;

/// How long to give the kernel to complete neighbor resolution after the
/// probe datagram.
#[cfg(target_os = "linux")]
const PROBE_SETTLE: std::time::Duration = std::time::Duration::from_millis(300);

/// Neighbor resolution backed by the operating system's ARP table.
///
/// On Linux this reads `/proc/net/arp`; when the address has no entry yet, a
/// throwaway UDP datagram nudges the kernel into resolving it and the table
/// is read again. On other platforms every lookup fails with an explanation,
/// so embedders there must supply their own [`NeighborResolver`].
pub struct SystemNeighbors;

#[async_trait]
impl NeighborResolver for SystemNeighbors {
    async fn resolve(&self, address: Ipv4Addr) -> Result<MacAddress, ResolveError> {
        system_lookup(address).await
    }
}

#[cfg(target_os = "linux")]
async fn system_lookup(address: Ipv4Addr) -> Result<MacAddress, ResolveError> {
    if let Some(mac) = arp_entry(address)? {
        return Ok(mac);
    }
    probe(address).await;
    arp_entry(address)?
        .ok_or_else(|| ResolveError::new(format!("no neighbor entry for {address}")))
}

#[cfg(target_os = "linux")]
fn arp_entry(address: Ipv4Addr) -> Result<Option<MacAddress>, ResolveError> {
    let entries = procfs::net::arp()
        .map_err(|err| ResolveError::new(format!("could not read the ARP table: {err}")))?;
    Ok(entries.into_iter().find_map(|entry| {
        if entry.ip_address != address {
            return None;
        }
        // Incomplete entries carry an all-zero hardware address.
        match entry.hw_address {
            Some(hw) if hw != [0u8; 6] => Some(MacAddress::from_bytes(hw)),
            _ => None,
        }
    }))
}

/// Sends one throwaway byte at the address so the kernel performs neighbor
/// resolution, then waits briefly for the table to fill in.
#[cfg(target_os = "linux")]
async fn probe(address: Ipv4Addr) {
    match tokio::net::UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(socket) => {
            if let Err(err) = socket.send_to(&[0u8], (address, PROBE_PORT)).await {
                tracing::debug!("Neighbor probe to {} failed: {}", address, err);
            }
            tokio::time::sleep(PROBE_SETTLE).await;
        }
        Err(err) => {
            tracing::debug!("Could not bind a neighbor probe socket: {}", err);
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn system_lookup(_address: Ipv4Addr) -> Result<MacAddress, ResolveError> {
    Err(ResolveError::new(
        "system neighbor lookup is only implemented on Linux; inject a NeighborResolver",
    ))
}

/// A [`NeighborResolver`] with a canned answer, for tests and for networks
/// where the television's MAC is known without asking.
///
/// Clones share the lookup counter.
///
/// # Example
///
/// ```
/// use tv_volume_relay::{MacAddress, MockNeighbors};
///
/// let resolver = MockNeighbors::answering(MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap());
/// assert_eq!(resolver.lookups(), 0);
/// ```
#[derive(Clone)]
pub struct MockNeighbors {
    answer: Result<MacAddress, String>,
    lookups: Arc<AtomicUsize>,
}

impl MockNeighbors {
    /// Creates a resolver that answers every lookup with `mac`.
    #[must_use]
    pub fn answering(mac: MacAddress) -> Self {
        Self {
            answer: Ok(mac),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a resolver that fails every lookup with `reason`.
    #[must_use]
    pub fn unresolvable(reason: impl Into<String>) -> Self {
        Self {
            answer: Err(reason.into()),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many lookups have been issued.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NeighborResolver for MockNeighbors {
    async fn resolve(&self, _address: Ipv4Addr) -> Result<MacAddress, ResolveError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(mac) => Ok(mac.clone()),
            Err(reason) => Err(ResolveError::new(reason.clone())),
        }
    }
}

/// The memoized outcome of one fresh verification.
#[derive(Debug, Clone)]
enum Outcome {
    Verified,
    Mismatch { resolved: MacAddress },
    Unresolved { reason: String },
}

struct CacheEntry {
    address: String,
    mac: String,
    outcome: Outcome,
}

/// Verifies that the configured address still belongs to the configured MAC.
pub(crate) struct BindingVerifier {
    resolver: Arc<dyn NeighborResolver>,
    cache: Mutex<Option<CacheEntry>>,
    events: Option<EventCallback>,
}

impl BindingVerifier {
    pub fn new(resolver: Arc<dyn NeighborResolver>, events: Option<EventCallback>) -> Self {
        Self {
            resolver,
            cache: Mutex::new(None),
            events,
        }
    }

    /// Confirms the binding, resolving at most once per configured pair.
    ///
    /// Missing configuration fails before the cache is consulted and is
    /// never memoized. Fresh negative outcomes emit an event; cached
    /// replays stay silent.
    pub async fn verify(&self, address: &str, expected_mac: &str) -> Result<(), TvError> {
        if address.is_empty() {
            return Err(TvError::AddressMissing);
        }
        if expected_mac.is_empty() {
            return Err(TvError::MacMissing);
        }

        // Held across the lookup so concurrent first commands resolve once.
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.address == address && entry.mac == expected_mac {
                tracing::debug!("Reusing cached binding verdict for {}", address);
                return outcome_to_result(&entry.outcome, address, expected_mac);
            }
        }

        let outcome = self.check(address, expected_mac).await;
        let result = outcome_to_result(&outcome, address, expected_mac);
        match &outcome {
            Outcome::Verified => {
                tracing::debug!("MAC binding verified for {}", address);
            }
            Outcome::Mismatch { resolved } => {
                tracing::warn!(
                    "Device at {} answered with MAC {}, expected {}",
                    address,
                    resolved,
                    MacAddress::normalize(expected_mac)
                );
                emit(
                    self.events.as_ref(),
                    RelayEvent::BindingMismatch {
                        expected: MacAddress::normalize(expected_mac),
                        resolved: resolved.to_string(),
                    },
                );
            }
            Outcome::Unresolved { reason } => {
                tracing::warn!("Could not verify device at {}: {}", address, reason);
                emit(
                    self.events.as_ref(),
                    RelayEvent::BindingUnresolved {
                        address: address.to_string(),
                        reason: reason.clone(),
                    },
                );
            }
        }
        *cache = Some(CacheEntry {
            address: address.to_string(),
            mac: expected_mac.to_string(),
            outcome,
        });
        result
    }

    async fn check(&self, address: &str, expected_mac: &str) -> Outcome {
        let parsed: Ipv4Addr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                return Outcome::Unresolved {
                    reason: format!("{address} is not an IPv4 address"),
                }
            }
        };
        match self.resolver.resolve(parsed).await {
            Ok(resolved) => {
                if resolved.as_str() == MacAddress::normalize(expected_mac) {
                    Outcome::Verified
                } else {
                    Outcome::Mismatch { resolved }
                }
            }
            Err(err) => Outcome::Unresolved {
                reason: err.to_string(),
            },
        }
    }
}

fn outcome_to_result(outcome: &Outcome, address: &str, expected_mac: &str) -> Result<(), TvError> {
    match outcome {
        Outcome::Verified => Ok(()),
        Outcome::Mismatch { resolved } => Err(TvError::BindingMismatch {
            address: address.to_string(),
            expected: MacAddress::normalize(expected_mac),
            resolved: resolved.to_string(),
        }),
        Outcome::Unresolved { reason } => {
            Err(TvError::binding_unresolved(address, reason.clone()))
        }
    }
}
