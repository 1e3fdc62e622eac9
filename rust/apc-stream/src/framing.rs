//! Frame extraction from the (optionally transcoded) byte stream.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use apc_wire::{ETB, ETX};

use crate::decoder::StreamDecoder;
use crate::TransportError;

/// Upper bound for a single record on the wire.
pub const MAX_RECORD_LEN: usize = 4096;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 256;

/// Reads raw protocol frames off a byte stream.
///
/// Bytes are transcoded by the configured [`StreamDecoder`] and accumulated
/// until a terminator (ETX or ETB) is seen; everything up to and including
/// the terminator is one frame. Buffering instead of trusting one-record-per
/// -read keeps the reader correct when records split or coalesce across
/// reads.
pub struct FrameReader<R> {
    stream: R,
    decoder: Box<dyn StreamDecoder>,
    timeout: Option<Duration>,
    buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a reader over `stream`.
    ///
    /// When `timeout` is set it is armed before every read; expiry is
    /// reported as [`TransportError::TimedOut`].
    pub fn new(stream: R, decoder: Box<dyn StreamDecoder>, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            decoder,
            timeout,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next raw frame, terminator included.
    ///
    /// End of stream is [`TransportError::Closed`]; any other transport
    /// failure aborts the reader.
    pub async fn next_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| matches!(*b, ETB | ETX)) {
                let frame: Vec<u8> = self.buf.drain(..=pos).collect();
                trace!(len = frame.len(), "frame received");
                return Ok(frame);
            }

            if self.buf.len() > MAX_RECORD_LEN {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("record exceeds {MAX_RECORD_LEN} bytes without terminator"),
                )));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.read_chunk(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.decoder.decode(&chunk[..n], &mut self.buf)?;
        }
    }

    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize, TransportError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.stream.read(chunk))
                .await
                .map_err(|_| TransportError::TimedOut)?
                .map_err(TransportError::Io),
            None => self.stream.read(chunk).await.map_err(TransportError::Io),
        }
    }
}
