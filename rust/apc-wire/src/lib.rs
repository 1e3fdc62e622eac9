#![deny(unsafe_code)]

//! Wire-level types for the Avaya Proactive Contact agent protocol.
//!
//! The agent server speaks a record-framed ASCII protocol: every record opens
//! with a 55-byte fixed-width header and closes with a one-byte terminator.
//! This crate owns the vocabulary shared by every layer above it:
//!
//! - the frame separators ([`RS`], [`ETB`], [`ETX`])
//! - the decoded record type ([`Event`]) and its classification predicates
//! - the correlation tag ([`InvokeId`])
//! - the outbound encoder ([`encode_command`]) and inbound decoder
//!   ([`decode_event`])

mod codec;
mod event;

pub use codec::{decode_event, encode_command, DecodeError, EncodeError};
pub use event::{Event, EventType, InvokeId};

/// Separates segments within a frame.
pub const RS: u8 = 0x1E;
/// Terminates a frame that is continued by the next frame.
pub const ETB: u8 = 0x17;
/// Terminates a complete frame.
pub const ETX: u8 = 0x03;

/// Length of the fixed-width header preceding the payload.
pub const HEADER_LEN: usize = 55;

/// Message code closing a successful response.
pub const CODE_COMPLETE: &str = "M00000";
/// Message code marking a data segment.
pub const CODE_DATA: &str = "M00001";
/// Status code the server sends while a slow operation runs.
pub const CODE_PENDING: &str = "S28833";
/// Startup banner carried by the first notification after connect.
pub const CODE_STARTUP: &str = "AGENT_STARTUP";
