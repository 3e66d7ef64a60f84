//! Frame builder for outbound OPP messages.
//!
//! A frame is an address byte, a command byte, a payload and a trailing CRC8
//! over everything from the address byte on. Several frames can share one
//! builder; [`FrameBuilder::end_of_message`] appends the terminator that makes
//! the boards act on what came before.

use std::fmt;

use crate::commands::EOM_CMD;
use crate::crc::crc8_whole_msg;

#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    buffer: Vec<u8>,
    frame_start: usize,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            frame_start: 0,
        }
    }

    /// Starts a frame addressed to `addr` carrying `cmd`.
    pub fn begin(&mut self, addr: u8, cmd: u8) -> &mut Self {
        self.frame_start = self.buffer.len();
        self.buffer.push(addr);
        self.buffer.push(cmd);
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_u16_be(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_u32_be(&mut self, value: u32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_zeros(&mut self, count: usize) -> &mut Self {
        self.buffer.resize(self.buffer.len() + count, 0);
        self
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Appends the CRC8 of the current frame.
    pub fn finish(&mut self) -> &mut Self {
        let crc = crc8_whole_msg(self.buffer.get(self.frame_start..).unwrap_or_default());
        self.buffer.push(crc);
        self.frame_start = self.buffer.len();
        self
    }

    pub fn end_of_message(&mut self) -> &mut Self {
        self.buffer.push(EOM_CMD);
        self.frame_start = self.buffer.len();
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Lazily formats bytes as space separated `0x..` pairs for log lines.
#[derive(Clone, Copy)]
pub struct HexDump<'a>(&'a [u8]);

pub fn hex_dump(bytes: &[u8]) -> HexDump<'_> {
    HexDump(bytes)
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:#04x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_crc() {
        let mut builder = FrameBuilder::new();
        builder.begin(0x20, 0x0D).write_zeros(4).finish();
        assert_eq!(builder.as_slice(), &[0x20, 0x0D, 0, 0, 0, 0, 0x60]);
    }

    #[test]
    fn test_each_frame_gets_its_own_crc() {
        let mut builder = FrameBuilder::with_capacity(15);
        builder.begin(0x20, 0x0D).write_zeros(4).finish();
        builder.begin(0x21, 0x0D).write_zeros(4).finish();
        builder.end_of_message();
        let bytes = builder.into_inner();
        assert_eq!(bytes.len(), 15);
        assert_eq!(bytes.get(6), Some(&0x60));
        assert_eq!(bytes.get(13), Some(&0x49));
        assert_eq!(bytes.last(), Some(&EOM_CMD));
    }

    #[test]
    fn test_big_endian_writers() {
        let mut builder = FrameBuilder::new();
        builder.write_u16_be(0x0102).write_u32_be(0x0304_0506);
        assert_eq!(builder.as_slice(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(builder.len(), 6);
        assert!(!builder.is_empty());
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x20, 0x0D, 0xFF]).to_string(), "0x20 0x0d 0xff");
        assert_eq!(hex_dump(&[]).to_string(), "");
    }
}
