//! Error taxonomy.
//!
//! Transport loss and a failed startup handshake are terminal for the whole
//! client; everything else terminates at most the request that observed it
//! and leaves the connection usable.

use apc_stream::TransportError;
use apc_wire::{DecodeError, EncodeError, Event};

/// A server-originated error, carried verbatim from the response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvayaError {
    /// Six-character code of the form `E` + 5 digits.
    pub code: String,
}

impl std::fmt::Display for AvayaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent server error {}", self.code)
    }
}

impl std::error::Error for AvayaError {}

/// Error from a client operation.
#[derive(Debug)]
pub enum ClientError {
    /// The transport failed (dial, read deadline, IO).
    Transport(TransportError),
    /// An outbound command did not encode. The connection is unaffected.
    Encode(EncodeError),
    /// An inbound frame did not decode; the stream is desynchronized and the
    /// connection is torn down.
    Decode(DecodeError),
    /// The server rejected the command.
    Avaya(AvayaError),
    /// A request's event stream carried a record it has no transition for.
    /// Fatal to that request only.
    UnexpectedEvent(Box<Event>),
    /// A response body did not have the shape the command projects.
    InvalidPayload(String),
    /// The startup handshake did not produce the `AGTSTART` banner.
    HelloNotReceived,
    /// A notification subscription is already active.
    AlreadySubscribed,
    /// The request's cancellation scope fired.
    Canceled,
    /// The client was closed at submission time or became closed mid-request.
    ConnectionClosed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "transport error: {e}"),
            ClientError::Encode(e) => write!(f, "cannot encode command: {e}"),
            ClientError::Decode(e) => write!(f, "cannot decode event: {e}"),
            ClientError::Avaya(e) => write!(f, "{e}"),
            ClientError::UnexpectedEvent(event) => write!(
                f,
                "unexpected {} event for keyword {}",
                event.event_type, event.keyword
            ),
            ClientError::InvalidPayload(context) => write!(f, "invalid payload: {context}"),
            ClientError::HelloNotReceived => {
                write!(f, "server did not send the AGTSTART banner")
            }
            ClientError::AlreadySubscribed => {
                write!(f, "a notification subscription is already active")
            }
            ClientError::Canceled => write!(f, "request canceled"),
            ClientError::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(e) => Some(e),
            ClientError::Encode(e) => Some(e),
            ClientError::Decode(e) => Some(e),
            ClientError::Avaya(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e)
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Encode(e)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Decode(e)
    }
}

impl From<AvayaError> for ClientError {
    fn from(e: AvayaError) -> Self {
        ClientError::Avaya(e)
    }
}
