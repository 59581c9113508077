//! One WebSocket session to the television.
//!
//! Each command opens its own session and closes it again; nothing here is
//! kept alive between commands. The TLS side accepts any server certificate:
//! televisions present self-signed certificates on their local control port,
//! and the device identity check this client relies on is the MAC binding,
//! not the certificate chain.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};

use crate::TvError;

/// Bound on establishing the TCP connection, TLS handshake, and upgrade.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on writing one frame.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// An open WebSocket session.
#[derive(Debug)]
pub(crate) struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl WsSession {
    /// Dials `url` and completes the WebSocket upgrade.
    ///
    /// `secure` selects the TLS connector with relaxed certificate
    /// validation; plaintext URLs pass `false`.
    pub(crate) async fn connect(url: &str, secure: bool) -> Result<Self, TvError> {
        let connector = if secure {
            let config = insecure_client_config()
                .map_err(|err| TvError::connect(url, format!("TLS setup failed: {err}")))?;
            Connector::Rustls(config)
        } else {
            Connector::Plain
        };

        let handshake = connect_async_tls_with_config(url, None, true, Some(connector));
        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, handshake)
            .await
            .map_err(|_| {
                TvError::connect(url, format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()))
            })?
            .map_err(|err| classify_connect_error(url, err))?;

        tracing::debug!(
            "WebSocket session open to {} (HTTP {})",
            url,
            response.status()
        );
        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }

    /// Sends one text frame.
    pub(crate) async fn send(&mut self, frame: String) -> Result<(), TvError> {
        tracing::trace!("-> {}", frame);
        tokio::time::timeout(SEND_TIMEOUT, self.stream.send(Message::Text(frame)))
            .await
            .map_err(|_| TvError::send(format!("timed out after {}s", SEND_TIMEOUT.as_secs())))?
            .map_err(|err| TvError::send(err.to_string()))
    }

    /// Receives one text frame, waiting at most `wait`.
    ///
    /// Ping and pong frames are skipped; a close frame or stream end is a
    /// [`TvError::ConnectionClosed`].
    pub(crate) async fn receive(&mut self, wait: Duration) -> Result<String, TvError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let message = match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => {
                    return Err(TvError::receive(format!(
                        "timed out after {}s",
                        wait.as_secs()
                    )))
                }
                Ok(None) => return Err(TvError::ConnectionClosed),
                Ok(Some(Err(err))) => return Err(TvError::receive(err.to_string())),
                Ok(Some(Ok(message))) => message,
            };
            match message {
                Message::Text(text) => {
                    tracing::trace!("<- {}", text);
                    return Ok(text);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Binary(_) => return Err(TvError::receive("unexpected binary frame")),
                Message::Close(_) => return Err(TvError::ConnectionClosed),
            }
        }
    }

    /// Closes the session. Always succeeds from the caller's perspective;
    /// an unclean close is only worth a debug line.
    pub(crate) async fn close(mut self) {
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!("WebSocket close to {} was not clean: {}", self.url, err);
        }
    }
}

fn classify_connect_error(url: &str, err: tungstenite::Error) -> TvError {
    match err {
        tungstenite::Error::Http(response) => TvError::Upgrade {
            status: response.status().as_u16(),
        },
        other => TvError::connect(url, other.to_string()),
    }
}

fn insecure_client_config() -> Result<Arc<rustls::ClientConfig>, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts whatever certificate the television presents.
///
/// Signature validation still runs; only the chain and name checks are
/// skipped, since a self-signed device certificate can never pass them.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
