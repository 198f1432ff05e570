//! Encoding of protocol primitives and packet framing.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// Growable payload buffer.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_u16_le(&mut self, value: u16) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u24_le(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes()[..3])
    }

    pub fn write_u32_le(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64_le(&mut self, value: u64) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Length-encoded integer (shortest form).
    pub fn write_lenenc_int(&mut self, value: u64) -> &mut Self {
        match value {
            0..=250 => self.write_u8(value as u8),
            251..=0xFFFF => self.write_u8(0xFC).write_u16_le(value as u16),
            0x1_0000..=0xFF_FFFF => self.write_u8(0xFD).write_u24_le(value as u32),
            _ => self.write_u8(0xFE).write_u64_le(value),
        }
    }

    /// Length-encoded byte string.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.write_lenenc_int(data.len() as u64).write_bytes(data)
    }

    /// Length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) -> &mut Self {
        self.write_lenenc_bytes(s.as_bytes())
    }

    /// NUL-terminated string.
    pub fn write_null_string(&mut self, s: &str) -> &mut Self {
        self.write_bytes(s.as_bytes()).write_u8(0)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    pub fn write_zeros(&mut self, count: usize) -> &mut Self {
        self.buffer.resize(self.buffer.len() + count, 0);
        self
    }
}

/// Frame `payload` into one or more packets starting at `sequence_id`.
///
/// Returns the framed bytes and the next sequence id. A payload that is an
/// exact multiple of the maximum size is terminated by an empty packet.
pub fn frame_packets(payload: &[u8], mut sequence_id: u8) -> (Vec<u8>, u8) {
    let mut out = Vec::with_capacity(payload.len() + PacketHeader::SIZE);
    let mut chunks = payload.chunks(MAX_PACKET_SIZE).peekable();
    let mut last_len = 0;

    if chunks.peek().is_none() {
        out.extend_from_slice(&header(0, sequence_id));
        return (out, sequence_id.wrapping_add(1));
    }

    for chunk in chunks {
        out.extend_from_slice(&header(chunk.len(), sequence_id));
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        last_len = chunk.len();
    }
    if last_len == MAX_PACKET_SIZE {
        out.extend_from_slice(&header(0, sequence_id));
        sequence_id = sequence_id.wrapping_add(1);
    }
    (out, sequence_id)
}

fn header(len: usize, sequence_id: u8) -> [u8; 4] {
    PacketHeader {
        payload_length: len as u32,
        sequence_id,
    }
    .to_bytes()
}
