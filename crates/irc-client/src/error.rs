//! Error kinds, one enum per concern rather than a single flat type — the
//! same split the richest protocol crate in the retrieval pack uses for its
//! own `Error`/transport errors.

use thiserror::Error;

/// A caller-supplied argument was malformed; rejected before anything is sent.
#[derive(Debug, Error)]
pub enum InvalidArgument {
    #[error("nickname must not be empty")]
    EmptyNick,
    #[error("target name {0:?} contains a comma; pass multiple targets separately")]
    TargetHasComma(String),
    #[error("channel name {0:?} is invalid: {1}")]
    BadChannelName(String, irc_common::ChannelNameError),
    #[error("mode string {0:?} is empty")]
    EmptyModeString,
    #[error("count {0} is out of range")]
    CountOutOfRange(i64),
}

/// Top-level error surfaced by the session and its components.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error("outbound message is invalid: {0}")]
    InvalidMessage(#[from] irc_proto::MessageError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("server reported numeric error {code}: {message}")]
    NumericProtocolError { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("operation on a disposed session")]
    Disposed,

    #[error("quit timed out waiting for the server to close the connection")]
    Timeout,
}

/// Failures from the socket/TLS layer (component C).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported URL scheme {0:?}; expected \"irc\" or \"ircs\"")]
    InvalidUrlScheme(String),
    #[error("could not resolve host {0:?}")]
    UnresolvedHost(String),
    #[error("connection reset")]
    ConnectionReset,
    #[error("not connected")]
    NotConnected,
    #[error("peer certificate rejected by validator")]
    CertificateRejected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "tls-native")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
    #[cfg(feature = "tls-rustls")]
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
}
