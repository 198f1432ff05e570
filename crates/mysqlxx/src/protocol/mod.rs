//! MySQL client/server protocol building blocks.
//!
//! Every packet starts with a 4-byte header: a 3-byte little-endian payload
//! length and a 1-byte sequence number. Payloads of 2^24 - 1 bytes or more
//! are split across several packets.

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Maximum payload size for a single packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// Only protocol version the handshake accepts.
pub const PROTOCOL_VERSION: u8 = 10;

/// Capability flags negotiated during the handshake.
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Flags this client always asks for.
    pub const BASE_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_CONNECT_ATTRS
        | CLIENT_DEPRECATE_EOF;
}

/// Server status flags carried by OK and EOF packets.
pub mod status_flags {
    /// Another result follows the current one
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Command bytes (COM_xxx) the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Close the session
    Quit = 0x01,
    /// Text protocol statement
    Query = 0x03,
    /// Liveness round trip
    Ping = 0x0e,
}

/// Character set sent in the handshake response (utf8mb4_general_ci).
pub const DEFAULT_CHARSET: u8 = 45;

/// A packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 4;

    /// Decode from the 4 header bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    /// Encode to 4 bytes.
    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Kind of a server response, by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// 0x00
    Ok,
    /// 0xFF
    Error,
    /// 0xFE on a short payload (EOF, or auth switch during the handshake)
    Eof,
    /// 0xFB, server asks for a local file
    LocalInfile,
    /// Anything else: column counts, rows, auth continuation data
    Data,
}

impl PacketType {
    /// Classify a payload.
    pub fn of(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => PacketType::Ok,
            Some(0xFF) => PacketType::Error,
            Some(0xFE) if payload.len() < 9 => PacketType::Eof,
            Some(0xFB) => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

/// Parsed ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    /// Empty when the server omitted it (pre-4.1 style)
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Whether the server rejected the credentials (ER_ACCESS_DENIED_ERROR and friends).
    pub fn is_access_denied(&self) -> bool {
        matches!(self.error_code, 1044 | 1045 | 1698) || self.sql_state == "28000"
    }

    /// SQLSTATE, if the server sent one.
    pub fn sql_state(&self) -> Option<String> {
        (!self.sql_state.is_empty()).then(|| self.sql_state.clone())
    }
}

/// Parsed EOF packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encoding() {
        let header = PacketHeader {
            payload_length: 0x0012_3456,
            sequence_id: 7,
        };
        assert_eq!(header.to_bytes(), [0x56, 0x34, 0x12, 7]);
        assert_eq!(PacketHeader::from_bytes([0x56, 0x34, 0x12, 7]), header);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn test_header_max_size() {
        let header = PacketHeader {
            payload_length: MAX_PACKET_SIZE as u32,
            sequence_id: 255,
        };
        assert_eq!(header.to_bytes(), [0xFF, 0xFF, 0xFF, 255]);
    }

    #[test]
    fn test_packet_type_detection() {
        assert_eq!(PacketType::of(&[0x00, 0, 0, 2, 0, 0, 0]), PacketType::Ok);
        assert_eq!(PacketType::of(&[0xFF, 0x15, 0x04]), PacketType::Error);
        assert_eq!(PacketType::of(&[0xFE, 0, 0, 2, 0]), PacketType::Eof);
        assert_eq!(PacketType::of(&[0xFE; 20]), PacketType::Data);
        assert_eq!(PacketType::of(&[0xFB, b'f']), PacketType::LocalInfile);
        assert_eq!(PacketType::of(&[0x01]), PacketType::Data);
        assert_eq!(PacketType::of(&[]), PacketType::Data);
    }

    #[test]
    fn test_access_denied_detection() {
        let denied = ErrPacket {
            error_code: 1045,
            sql_state: "28000".to_string(),
            error_message: "Access denied".to_string(),
        };
        assert!(denied.is_access_denied());
        assert_eq!(denied.sql_state(), Some("28000".to_string()));

        let syntax = ErrPacket {
            error_code: 1064,
            sql_state: String::new(),
            error_message: "syntax".to_string(),
        };
        assert!(!syntax.is_access_denied());
        assert_eq!(syntax.sql_state(), None);
    }
}
