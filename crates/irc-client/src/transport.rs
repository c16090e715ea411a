//! Owns the TCP socket, optionally wrapped in TLS (component C).
//!
//! Boxed two-variant enum to keep the type small and avoid a large size
//! difference between the plaintext and TLS cases, with a `lazy_static`
//! connector built once and reused across connections.

use std::{
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use lazy_static::lazy_static;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::events::Event;

#[cfg(feature = "tls-native")]
use tokio_native_tls::TlsStream;
#[cfg(feature = "tls-rustls")]
use tokio_rustls::client::TlsStream;

#[cfg(feature = "tls-native")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_native_tls::TlsConnector =
        tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::builder().build().unwrap());
}

#[cfg(feature = "tls-rustls")]
lazy_static! {
    static ref TLS_CONNECTOR: tokio_rustls::TlsConnector = {
        let mut roots = tokio_rustls::rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().expect("failed to load native certs") {
            let _ = roots.add(cert);
        }
        let config = tokio_rustls::rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        tokio_rustls::TlsConnector::from(std::sync::Arc::new(config))
    };
}

/// Default port for both schemes absent an explicit `:port`.
pub const DEFAULT_PORT: u16 = 6667;

/// A connection endpoint parsed from an `irc://`/`ircs://` URL, or built
/// directly from a host/port pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Endpoint {
        Endpoint {
            host: host.into(),
            port,
            tls,
        }
    }

    /// Parse `irc://host[:port]` or `ircs://host[:port]`.
    pub fn parse_url(url: &str) -> Result<Endpoint, TransportError> {
        let (tls, rest) = if let Some(rest) = url.strip_prefix("ircs://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("irc://") {
            (false, rest)
        } else {
            let scheme = url.split("://").next().unwrap_or(url).to_owned();
            return Err(TransportError::InvalidUrlScheme(scheme));
        };

        match rest.rsplit_once(':') {
            Some((host, port_str)) if port_str.bytes().all(|b| b.is_ascii_digit()) && !port_str.is_empty() => {
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| TransportError::InvalidUrlScheme(url.to_owned()))?;
                Ok(Endpoint::new(host, port, tls))
            }
            _ => Ok(Endpoint::new(rest, DEFAULT_PORT, tls)),
        }
    }
}

/// The peer certificate and chain presented during a TLS handshake, along
/// with the policy-errors bitset the connector's own validation produced
/// (always `0` here: reaching this point means the connector's built-in
/// chain validation already passed, so the bitset only has room to grow if
/// a future connector surfaces soft failures it still connects through).
pub struct PeerCertificate {
    pub der: Vec<u8>,
    pub chain: Vec<Vec<u8>>,
    pub policy_errors: u32,
}

/// Caller-supplied hook that may override the default TLS trust decision.
pub trait CertValidator: Send + Sync {
    fn validate(&self, cert: &PeerCertificate) -> bool;
}

/// Accepts whatever the underlying TLS stack already approved.
pub struct DefaultCertValidator;

impl CertValidator for DefaultCertValidator {
    fn validate(&self, _cert: &PeerCertificate) -> bool {
        true
    }
}

// We box the fields to keep the enum small and avoid the large size
// difference between the TCP and TLS variants (rustls's stream type is much
// larger than a bare `TcpStream`).
#[derive(Debug)]
pub enum Transport {
    Tcp(Box<TcpStream>),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    pub async fn connect(
        endpoint: &Endpoint,
        validator: &dyn CertValidator,
        ev_tx: &mpsc::Sender<Event>,
    ) -> Result<Transport, TransportError> {
        let addr = resolve(&endpoint.host, endpoint.port).await?;
        if endpoint.tls {
            Transport::connect_tls(addr, &endpoint.host, validator, ev_tx).await
        } else {
            Transport::connect_tcp(addr).await
        }
    }

    async fn connect_tcp(addr: SocketAddr) -> Result<Transport, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Transport::Tcp(Box::new(stream)))
    }

    #[cfg(feature = "tls-native")]
    async fn connect_tls(
        addr: SocketAddr,
        sni_host: &str,
        validator: &dyn CertValidator,
        ev_tx: &mpsc::Sender<Event>,
    ) -> Result<Transport, TransportError> {
        let tcp = TcpStream::connect(addr).await?;
        let tls = TLS_CONNECTOR.connect(sni_host, tcp).await?;

        let der = tls
            .get_ref()
            .peer_certificate()
            .ok()
            .flatten()
            .and_then(|cert| cert.to_der().ok())
            .unwrap_or_default();
        // native-tls exposes only the leaf certificate, not the full chain.
        let cert = PeerCertificate { der, chain: Vec::new(), policy_errors: 0 };
        if !report_and_validate(validator, ev_tx, cert).await {
            return Err(TransportError::CertificateRejected);
        }

        Ok(Transport::Tls(Box::new(tls)))
    }

    #[cfg(feature = "tls-rustls")]
    async fn connect_tls(
        addr: SocketAddr,
        sni_host: &str,
        validator: &dyn CertValidator,
        ev_tx: &mpsc::Sender<Event>,
    ) -> Result<Transport, TransportError> {
        let tcp = TcpStream::connect(addr).await?;
        let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(sni_host.to_owned())
            .map_err(|_| TransportError::UnresolvedHost(sni_host.to_owned()))?;
        let tls = TLS_CONNECTOR
            .connect(server_name, tcp)
            .await
            .map_err(TransportError::Io)?;

        let peer_certs = tls.get_ref().1.peer_certificates().unwrap_or(&[]);
        let der = peer_certs.first().map(|c| c.as_ref().to_vec()).unwrap_or_default();
        let chain = peer_certs.iter().skip(1).map(|c| c.as_ref().to_vec()).collect();
        let cert = PeerCertificate { der, chain, policy_errors: 0 };
        if !report_and_validate(validator, ev_tx, cert).await {
            return Err(TransportError::CertificateRejected);
        }

        Ok(Transport::Tls(Box::new(tls)))
    }
}

/// Invoke `validator` on the peer certificate, report the outcome as an
/// event, and return whether the handshake should proceed.
async fn report_and_validate(
    validator: &dyn CertValidator,
    ev_tx: &mpsc::Sender<Event>,
    cert: PeerCertificate,
) -> bool {
    let is_valid = validator.validate(&cert);
    let _ = ev_tx
        .send(Event::ValidateSslCertificate {
            der: cert.der,
            chain: cert.chain,
            policy_errors: cert.policy_errors,
            is_valid,
        })
        .await;
    is_valid
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    use std::net::ToSocketAddrs;
    let host = host.to_owned();
    tokio::task::spawn_blocking(move || (host.as_str(), port).to_socket_addrs())
        .await
        .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??
        .next()
        .ok_or_else(|| TransportError::UnresolvedHost(host_for_error(host, port)))
}

fn host_for_error(host: String, port: u16) -> String {
    format!("{host}:{port}")
}

/// Classify a read/write failure per SPEC_FULL.md §4.C: connection-reset
/// kinds are a clean (terminal) disconnect, everything else is surfaced.
pub fn classify_io_error(err: std::io::Error) -> TransportError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => TransportError::ConnectionReset,
        std::io::ErrorKind::NotConnected => TransportError::NotConnected,
        _ => TransportError::Io(err),
    }
}

pub fn is_clean_disconnect(err: &TransportError) -> bool {
    matches!(err, TransportError::ConnectionReset | TransportError::NotConnected)
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plaintext_url_with_default_port() {
        let ep = Endpoint::parse_url("irc://irc.example.org").unwrap();
        assert_eq!(ep, Endpoint::new("irc.example.org", DEFAULT_PORT, false));
    }

    #[test]
    fn parses_tls_url_with_explicit_port() {
        let ep = Endpoint::parse_url("ircs://irc.example.org:6697").unwrap();
        assert_eq!(ep, Endpoint::new("irc.example.org", 6697, true));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            Endpoint::parse_url("https://irc.example.org"),
            Err(TransportError::InvalidUrlScheme(_))
        ));
    }
}
