//! Decoded server records and their classification.

use crate::{CODE_COMPLETE, CODE_PENDING, CODE_STARTUP};

/// Correlation tag scoping a record to one outstanding request.
///
/// The wire field is four decimal digits, so tags issued to the server stay
/// in `1..=9999`. [`InvokeId::NOTIFICATION`] is far outside that range and is
/// used purely in-process: server-initiated notifications arrive with an
/// invoke id of `0` and are re-tagged to the notification slot before
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InvokeId(u32);

impl InvokeId {
    /// In-process slot for server-initiated notifications.
    pub const NOTIFICATION: Self = Self(u32::MAX);

    /// Create an invoke id from its raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for InvokeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The record type byte at header offset 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// An outbound command (only ever written, never received).
    Command,
    /// Acknowledgement that a slow operation has been accepted.
    Pending,
    /// A record carrying payload segments.
    Data,
    /// The terminal record of a request/response exchange.
    Response,
    /// The server is busy with a conflicting operation.
    Busy,
    /// A server-initiated record outside any request.
    Notification,
}

impl EventType {
    /// Map a wire byte to its type, if known.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'C' => Some(Self::Command),
            b'P' => Some(Self::Pending),
            b'D' => Some(Self::Data),
            b'R' => Some(Self::Response),
            b'B' => Some(Self::Busy),
            b'N' => Some(Self::Notification),
            _ => None,
        }
    }

    /// The wire byte for this type.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Command => b'C',
            Self::Pending => b'P',
            Self::Data => b'D',
            Self::Response => b'R',
            Self::Busy => b'B',
            Self::Notification => b'N',
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// A decoded server record.
///
/// When segments are present, `segments[0]` is the command-status digit
/// (`"0"` success, `"1"` error) and `segments[1]` is the six-character
/// message code; the classification predicates below encode the
/// status/code pairs the request and notification processors care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Command or notification category, at most 20 characters, trimmed.
    pub keyword: String,
    /// Record type.
    pub event_type: EventType,
    /// Peer-chosen client tag, trimmed. Informational.
    pub client: String,
    /// Server-side process id. Informational.
    pub process_id: u32,
    /// Correlation tag; `0` on the wire for notifications.
    pub invoke_id: InvokeId,
    /// Payload segments, in wire order.
    pub segments: Vec<String>,
    /// Whether the frame ended in ETB (continued by the next frame).
    pub incomplete: bool,
}

impl Event {
    fn has_status(&self, status: &str, code: &str) -> bool {
        self.segments.len() >= 2 && self.segments[0] == status && self.segments[1] == code
    }

    /// Keep-alive while a slow operation runs on the server.
    pub fn is_pending(&self) -> bool {
        self.event_type == EventType::Pending && self.has_status("0", CODE_PENDING)
    }

    /// Terminal success record of an exchange.
    pub fn is_success_response(&self) -> bool {
        self.event_type == EventType::Response && self.has_status("0", CODE_COMPLETE)
    }

    /// Terminal error record of an exchange. `segments[1]` carries the code.
    pub fn is_error_response(&self) -> bool {
        self.event_type == EventType::Response
            && self.segments.len() >= 2
            && self.segments[0] == "1"
            && self.segments[1].len() == 6
            && self.segments[1].starts_with('E')
    }

    /// A record carrying payload segments for the current request.
    ///
    /// Some deployments tag data records with `M00001`, some do not; only
    /// the type and status digit are required.
    pub fn is_data_message(&self) -> bool {
        self.event_type == EventType::Data
            && self.segments.len() >= 2
            && self.segments[0] == "0"
    }

    /// The startup banner sent once after connect.
    pub fn is_startup_notification(&self) -> bool {
        self.event_type == EventType::Notification && self.has_status("0", CODE_STARTUP)
    }

    /// Notification-typed equivalent of [`Event::is_success_response`].
    pub fn is_success_notification(&self) -> bool {
        self.event_type == EventType::Notification && self.has_status("0", CODE_COMPLETE)
    }

    /// Notification-typed equivalent of [`Event::is_error_response`].
    pub fn is_error_notification(&self) -> bool {
        self.event_type == EventType::Notification
            && self.segments.len() >= 2
            && self.segments[0] == "1"
            && self.segments[1].len() == 6
            && self.segments[1].starts_with('E')
    }

    /// Notification-typed equivalent of [`Event::is_data_message`].
    ///
    /// Success and startup notifications also carry status `"0"`, so callers
    /// folding a notification stream must test those first.
    pub fn is_data_notification(&self) -> bool {
        self.event_type == EventType::Notification
            && self.segments.len() >= 2
            && self.segments[0] == "0"
    }
}
