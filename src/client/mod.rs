//! Television protocol client.
//!
//! Every command runs one complete, disposable session:
//!
//! ```text
//!   verify MAC binding
//!   connect + WebSocket upgrade (TLS optional, validation relaxed)
//!   send register (with the stored client key)
//!   read one acknowledgement frame, discard it
//!   send the request
//!   close
//! ```
//!
//! No connection survives between commands and no response to a request is
//! awaited: once the request frame is on the wire the command counts as
//! delivered. Pairing uses the same session shape but keeps reading frames
//! until one carries a credential.

mod binding;
mod connection;
mod keystore;
mod protocol;

pub use binding::{MacAddress, MockNeighbors, NeighborResolver, SystemNeighbors};
pub use keystore::KeyStore;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::{RelayConfig, SharedConfig};
use crate::event::{emit, EventCallback, RelayEvent};
use crate::TvError;

use binding::BindingVerifier;
use connection::WsSession;

/// How many response frames a pairing attempt scans for a credential before
/// giving up. The accepted prompt arrives in the first frame or two.
const PAIRING_FRAME_LIMIT: usize = 5;

/// Bound on acknowledgement and status replies during a command.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound per response frame during pairing. Generous because the user is
/// walking to the television to accept the prompt.
const PAIRING_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection-per-command client for the television's remote-control API.
///
/// The client is stateless between calls apart from the credential file and
/// the memoized binding verdict, so one instance can serve any number of
/// concurrent command workers.
///
/// # Example
///
/// ```no_run
/// use tv_volume_relay::{KeyStore, RelayConfig, TvClient};
///
/// # async fn demo() -> Result<(), tv_volume_relay::TvError> {
/// let config = RelayConfig {
///     address: "192.168.1.50".into(),
///     mac_address: "AA:BB:CC:DD:EE:FF".into(),
///     ..Default::default()
/// };
/// let client = TvClient::new(config, KeyStore::beside("settings.ini"));
/// client.pair().await?;
/// client.volume_up().await?;
/// # Ok(())
/// # }
/// ```
pub struct TvClient {
    config: SharedConfig,
    keys: Arc<KeyStore>,
    binding: BindingVerifier,
    events: Option<EventCallback>,
}

impl TvClient {
    /// Creates a client using the operating system's neighbor table for
    /// binding verification.
    #[must_use]
    pub fn new(config: RelayConfig, key_store: KeyStore) -> Self {
        Self::assemble(
            SharedConfig::new(config),
            Arc::new(key_store),
            Arc::new(SystemNeighbors),
            None,
        )
    }

    /// Creates a client with a custom neighbor resolver.
    #[must_use]
    pub fn with_resolver(
        config: RelayConfig,
        key_store: KeyStore,
        resolver: impl NeighborResolver + 'static,
    ) -> Self {
        Self::assemble(
            SharedConfig::new(config),
            Arc::new(key_store),
            Arc::new(resolver),
            None,
        )
    }

    pub(crate) fn assemble(
        config: SharedConfig,
        keys: Arc<KeyStore>,
        resolver: Arc<dyn NeighborResolver>,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            config,
            keys,
            binding: BindingVerifier::new(resolver, events.clone()),
            events,
        }
    }

    /// Steps the television volume up by one.
    ///
    /// # Errors
    ///
    /// Returns a [`TvError`] when unpaired, when the binding check fails,
    /// or on a transport failure.
    pub async fn volume_up(&self) -> Result<(), TvError> {
        self.send_command(protocol::URI_VOLUME_UP, None).await
    }

    /// Steps the television volume down by one.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`volume_up`](Self::volume_up).
    pub async fn volume_down(&self) -> Result<(), TvError> {
        self.send_command(protocol::URI_VOLUME_DOWN, None).await
    }

    /// Sets the absolute television volume (0 to 100; negatives clamp to 0).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`volume_up`](Self::volume_up).
    pub async fn set_volume(&self, percent: i32) -> Result<(), TvError> {
        let percent = percent.max(0);
        self.send_command(protocol::URI_SET_VOLUME, Some(json!({ "volume": percent })))
            .await
    }

    /// Sets the television mute state.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`volume_up`](Self::volume_up).
    pub async fn set_mute(&self, mute: bool) -> Result<(), TvError> {
        self.send_command(protocol::URI_SET_MUTE, Some(json!({ "mute": mute })))
            .await
    }

    /// Toggles the television mute state.
    ///
    /// Reads the current audio status, inverts the mute flag, and writes it
    /// back. When the status frame has no readable flag the television is
    /// muted rather than left guessing, and the call still succeeds.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`volume_up`](Self::volume_up).
    pub async fn toggle_mute(&self) -> Result<(), TvError> {
        let key = self.keys.load().ok_or(TvError::NotPaired)?;
        let mut session = self.open_registered(Some(&key)).await?;
        self.discard_ack(&mut session).await;

        let status_request = protocol::request_message(protocol::URI_GET_STATUS, None);
        if let Err(err) = session.send(status_request).await {
            session.close().await;
            return Err(err);
        }
        let response = match session.receive(REPLY_TIMEOUT).await {
            Ok(response) => response,
            Err(err) => {
                session.close().await;
                return Err(err);
            }
        };

        match protocol::extract_muted_flag(&response) {
            Some(muted) => {
                let frame = protocol::request_message(
                    protocol::URI_SET_MUTE,
                    Some(json!({ "mute": !muted })),
                );
                let result = session.send(frame).await;
                session.close().await;
                result
            }
            None => {
                // Unreadable status: mute beats blasting at unknown volume.
                tracing::debug!("Audio status had no readable mute flag; forcing mute on");
                let frame = protocol::request_message(
                    protocol::URI_SET_MUTE,
                    Some(json!({ "mute": true })),
                );
                if let Err(err) = session.send(frame).await {
                    tracing::debug!("Fallback mute send failed: {}", err);
                }
                session.close().await;
                Ok(())
            }
        }
    }

    /// Pairs with the television.
    ///
    /// Sends a register frame without a credential, which makes the
    /// television show its pairing prompt, then scans up to five response
    /// frames for the client key the television issues once the prompt is
    /// accepted. The key is persisted only when actually found.
    ///
    /// # Errors
    ///
    /// [`TvError::PairingNoKey`] when the scanned frames carry no
    /// credential (the user should retry the on-screen prompt); transport
    /// errors surface as themselves so connectivity problems stay
    /// distinguishable.
    pub async fn pair(&self) -> Result<(), TvError> {
        let mut session = self.open_registered(None).await?;
        tracing::info!("Pairing requested; waiting for the on-screen prompt");
        emit(self.events.as_ref(), RelayEvent::PairingPrompt);

        let mut outcome = Err(TvError::PairingNoKey {
            frames: PAIRING_FRAME_LIMIT,
        });
        for _ in 0..PAIRING_FRAME_LIMIT {
            match session.receive(PAIRING_REPLY_TIMEOUT).await {
                Ok(frame) => {
                    if let Some(key) = protocol::extract_client_key(&frame) {
                        outcome = Ok(key);
                        break;
                    }
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        session.close().await;

        let key = outcome?;
        self.keys.save(&key)?;
        tracing::info!("Paired with the television; client key stored");
        emit(self.events.as_ref(), RelayEvent::Paired);
        Ok(())
    }

    /// Deletes the stored pairing credential.
    ///
    /// Unpairing when no credential exists is a success.
    ///
    /// # Errors
    ///
    /// Returns [`TvError::KeyStore`] if an existing credential file cannot
    /// be removed.
    pub fn unpair(&self) -> Result<(), TvError> {
        if !self.keys.is_paired() {
            return Ok(());
        }
        self.keys.delete()?;
        tracing::info!("Unpaired from the television; client key deleted");
        emit(self.events.as_ref(), RelayEvent::Unpaired);
        Ok(())
    }

    /// Returns `true` if a pairing credential is stored.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.keys.is_paired()
    }

    /// One ordinary command: load key, open a registered session, discard
    /// the acknowledgement, send the request, close.
    async fn send_command(
        &self,
        uri: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<(), TvError> {
        let key = self.keys.load().ok_or(TvError::NotPaired)?;
        let mut session = self.open_registered(Some(&key)).await?;
        self.discard_ack(&mut session).await;

        let frame = protocol::request_message(uri, payload);
        let result = session.send(frame).await;
        session.close().await;
        if result.is_ok() {
            tracing::debug!("Sent {}", uri);
        }
        result
    }

    /// Verifies the binding, connects, and registers. The session is handed
    /// back with the acknowledgement still unread.
    async fn open_registered(&self, client_key: Option<&str>) -> Result<WsSession, TvError> {
        let config = self.config.snapshot();
        self.binding
            .verify(&config.address, &config.mac_address)
            .await?;

        let mut session = WsSession::connect(&config.url(), config.secure).await?;
        if let Err(err) = session.send(protocol::register_message(client_key)).await {
            session.close().await;
            return Err(err);
        }
        Ok(session)
    }

    /// Reads and drops the register acknowledgement. The television always
    /// sends one; if it does not arrive the command is attempted anyway.
    async fn discard_ack(&self, session: &mut WsSession) {
        if let Err(err) = session.receive(REPLY_TIMEOUT).await {
            tracing::debug!("No register acknowledgement: {}", err);
        }
    }
}
