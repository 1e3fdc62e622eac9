//! Character decoding between the socket and the frame reader.
//!
//! Agent servers configured for Cyrillic deployments emit payload text in
//! Windows-1251. The decoder runs on raw chunks before frame boundaries are
//! found; that is safe for the supported codepages because they are
//! single-byte and map the control range (RS/ETB/ETX) to itself.

use std::io;

/// Transcodes raw transport bytes into the byte stream the framer scans.
pub trait StreamDecoder: Send {
    /// Decode `input` and append the result to `out`.
    fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()>;
}

/// Pass-through decoder; the default.
#[derive(Debug, Default)]
pub struct IdentityDecoder;

impl StreamDecoder for IdentityDecoder {
    fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }
}

/// Windows-1251 to UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Windows1251Decoder;

impl StreamDecoder for Windows1251Decoder {
    fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        let (text, _had_errors) = encoding_rs::WINDOWS_1251.decode_without_bom_handling(input);
        out.extend_from_slice(text.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_bytes_through() {
        let mut out = Vec::new();
        IdentityDecoder.decode(&[0x41, 0x1E, 0xE0], &mut out).unwrap();
        assert_eq!(out, vec![0x41, 0x1E, 0xE0]);
    }

    #[test]
    fn windows_1251_maps_cyrillic() {
        let mut out = Vec::new();
        // 0xCF 0xF0 = "Пр" in Windows-1251.
        Windows1251Decoder.decode(&[0xCF, 0xF0], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Пр");
    }

    #[test]
    fn windows_1251_keeps_separators_intact() {
        let mut out = Vec::new();
        Windows1251Decoder
            .decode(&[b'A', 0x1E, b'B', 0x17, b'C', 0x03], &mut out)
            .unwrap();
        assert_eq!(out, vec![b'A', 0x1E, b'B', 0x17, b'C', 0x03]);
    }
}
