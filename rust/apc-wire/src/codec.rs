//! Outbound command encoding and inbound event decoding.
//!
//! Every record is a 55-byte fixed-width ASCII header followed by an
//! optional RS-prefixed payload and a one-byte terminator:
//!
//! ```text
//! | 0..20   | keyword, left-justified, space-padded        |
//! | 20      | type byte                                    |
//! | 21..41  | client tag, left-justified, space-padded     |
//! | 41..47  | process id, left-justified decimal           |
//! | 47..51  | invoke id, left-justified decimal            |
//! | 51..55  | segment count, left-justified decimal        |
//! | 55..    | RS + segments joined by RS (count > 0 only)  |
//! | tail    | ETX, or ETB when the record is continued     |
//! ```

use crate::event::{Event, EventType, InvokeId};
use crate::{ETB, ETX, HEADER_LEN, RS};

/// Tag written into the client column of every outbound command.
const CLIENT_TAG: &str = "rust-apc";

/// Maximum keyword width in the header.
const KEYWORD_LEN: usize = 20;
/// Maximum decimal width of the invoke id field.
const INVOKE_ID_LEN: usize = 4;

/// Invalid argument while building an outbound command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The keyword does not fit the 20-byte header column.
    KeywordTooLong,
    /// The invoke id does not render in 4 decimal digits.
    InvokeIdTooLong,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::KeywordTooLong => {
                write!(f, "keyword exceeds {KEYWORD_LEN} bytes")
            }
            EncodeError::InvokeIdTooLong => {
                write!(f, "invoke id exceeds {INVOKE_ID_LEN} decimal digits")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Malformed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is shorter than a header plus terminator.
    TooShort { len: usize },
    /// A fixed-width header field did not parse.
    BadField { field: &'static str },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::TooShort { len } => {
                write!(f, "frame of {len} bytes is shorter than a header")
            }
            DecodeError::BadField { field } => write!(f, "cannot parse header field `{field}`"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Encode an outbound command frame.
///
/// `segments` land on the wire verbatim; they must not contain RS, ETB or
/// ETX, which the server would read as structure.
pub fn encode_command(
    keyword: &str,
    invoke_id: InvokeId,
    segments: &[String],
) -> Result<Vec<u8>, EncodeError> {
    if keyword.len() > KEYWORD_LEN {
        return Err(EncodeError::KeywordTooLong);
    }
    let invoke_id = invoke_id.raw().to_string();
    if invoke_id.len() > INVOKE_ID_LEN {
        return Err(EncodeError::InvokeIdTooLong);
    }

    let payload_len: usize = segments.iter().map(|s| s.len() + 1).sum();
    let mut buf = Vec::with_capacity(HEADER_LEN + payload_len + 1);

    push_padded(&mut buf, keyword, KEYWORD_LEN);
    buf.push(EventType::Command.as_byte());
    push_padded(&mut buf, CLIENT_TAG, 20);
    // Outbound process id is always zero; the server assigns its own.
    push_padded(&mut buf, "0", 6);
    push_padded(&mut buf, &invoke_id, INVOKE_ID_LEN);
    push_padded(&mut buf, &segments.len().to_string(), 4);

    for segment in segments {
        buf.push(RS);
        buf.extend_from_slice(segment.as_bytes());
    }
    buf.push(ETX);

    Ok(buf)
}

fn push_padded(buf: &mut Vec<u8>, value: &str, width: usize) {
    buf.extend_from_slice(value.as_bytes());
    for _ in value.len()..width {
        buf.push(b' ');
    }
}

/// Decode one raw frame, terminator included.
///
/// Header fields are parsed from their fixed columns; keyword and client are
/// trimmed. `incomplete` reflects an ETB terminator. Payload bytes that are
/// not valid UTF-8 (possible when the transport is not routed through a
/// charset decoder) are replaced rather than rejected.
pub fn decode_event(raw: &[u8]) -> Result<Event, DecodeError> {
    if raw.len() <= HEADER_LEN {
        return Err(DecodeError::TooShort { len: raw.len() });
    }

    let keyword = field_str(&raw[..20]);
    let event_type = EventType::from_byte(raw[20]).ok_or(DecodeError::BadField { field: "type" })?;
    let client = field_str(&raw[21..41]);
    let process_id = field_u32(&raw[41..47], "process id")?;
    let invoke_id = field_u32(&raw[47..51], "invoke id")?;
    let segment_count = field_u32(&raw[51..55], "segment count")?;

    let incomplete = raw[raw.len() - 1] == ETB;
    let mut body = &raw[HEADER_LEN..];
    if let [rest @ .., ETB | ETX] = body {
        body = rest;
    }

    // body[0] is the RS that opens the payload; the segments follow it. A
    // single empty segment leaves nothing after that RS, so the guard is on
    // the payload being present, not on bytes following it.
    let segments = if segment_count > 0 && !body.is_empty() {
        body[1..]
            .split(|b| *b == RS)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    } else {
        Vec::new()
    };

    Ok(Event {
        keyword,
        event_type,
        client,
        process_id,
        invoke_id: InvokeId::new(invoke_id),
        segments,
        incomplete,
    })
}

fn field_str(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_owned()
}

fn field_u32(raw: &[u8], field: &'static str) -> Result<u32, DecodeError> {
    String::from_utf8_lossy(raw)
        .trim()
        .parse()
        .map_err(|_| DecodeError::BadField { field })
}
