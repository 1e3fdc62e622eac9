#![deny(unsafe_code)]

//! Byte-stream plumbing for the Avaya Proactive Contact agent protocol.
//!
//! This crate sits between the socket and the session layer:
//!
//! - [`FrameReader`] turns a byte stream into raw ETX/ETB-terminated frames
//! - [`StreamDecoder`] transcodes legacy codepages before framing
//! - [`Connector`] abstracts how the underlying stream is dialed, with
//!   [`TcpConnector`] and [`TlsConnector`] as the bundled implementations
//!
//! Legacy servers that require TLS 1.0 with BEAST record-splitting disabled
//! are reached through a caller-supplied [`Connector`] (or an
//! already-connected stream handed to the session layer); the bundled
//! connectors only speak current TLS.

mod connector;
mod decoder;
mod framing;

pub use connector::{Connector, TcpConnector, TlsConnector};
pub use decoder::{IdentityDecoder, StreamDecoder, Windows1251Decoder};
pub use framing::{FrameReader, MAX_RECORD_LEN};

/// Error on the transport path.
#[derive(Debug)]
pub enum TransportError {
    /// IO error from the socket or TLS layer.
    Io(std::io::Error),
    /// The configured read deadline expired.
    TimedOut,
    /// The peer closed the stream.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::TimedOut => write!(f, "read deadline expired"),
            TransportError::Closed => write!(f, "connection closed by peer"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}
