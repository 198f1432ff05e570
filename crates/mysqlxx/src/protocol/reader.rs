//! Decoding of protocol primitives from a payload.

use crate::protocol::{EofPacket, ErrPacket, OkPacket};

/// Cursor over a packet payload.
///
/// Every read returns `None` instead of panicking when the payload is short.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Advance by `n` bytes if that many remain.
    pub fn skip(&mut self, n: usize) -> bool {
        self.take(n).is_some()
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take_array::<1>().map(|[b]| b)
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn read_u24_le(&mut self) -> Option<u32> {
        let [a, b, c] = self.take_array()?;
        Some(u32::from_le_bytes([a, b, c, 0]))
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Length-encoded integer.
    ///
    /// `0x00..=0xFA` is the value itself; `0xFC`, `0xFD` and `0xFE` prefix a
    /// 2, 3 or 8 byte value. `0xFB` (NULL) and `0xFF` yield `None`.
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        match self.read_u8()? {
            first @ 0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => None,
        }
    }

    /// Length-encoded byte string.
    pub fn read_lenenc_bytes(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_lenenc_int()?).ok()?;
        self.take(len)
    }

    /// Length-encoded string (lossy UTF-8).
    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// NUL-terminated string. A missing terminator consumes the rest.
    pub fn read_null_string(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let (bytes, consumed) = match rest.iter().position(|&b| b == 0) {
            Some(nul) => (&rest[..nul], nul + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        self.take(len)
    }

    /// Everything not read yet.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }

    /// OK packet, including its 0x00 header (or 0xFE when it ends a result set).
    pub fn parse_ok_packet(&mut self) -> Option<OkPacket> {
        if !matches!(self.read_u8()?, 0x00 | 0xFE) {
            return None;
        }
        Some(OkPacket {
            affected_rows: self.read_lenenc_int()?,
            last_insert_id: self.read_lenenc_int()?,
            status_flags: self.read_u16_le()?,
            warnings: self.read_u16_le()?,
        })
    }

    /// ERR packet, including its 0xFF header.
    pub fn parse_err_packet(&mut self) -> Option<ErrPacket> {
        if self.read_u8()? != 0xFF {
            return None;
        }
        let error_code = self.read_u16_le()?;
        let sql_state = if self.peek() == Some(b'#') {
            self.skip(1);
            String::from_utf8_lossy(self.take(5)?).into_owned()
        } else {
            String::new()
        };
        let error_message = String::from_utf8_lossy(self.read_rest()).into_owned();
        Some(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }

    /// EOF packet, including its 0xFE header.
    pub fn parse_eof_packet(&mut self) -> Option<EofPacket> {
        if self.read_u8()? != 0xFE {
            return None;
        }
        Some(EofPacket {
            warnings: self.read_u16_le()?,
            status_flags: self.read_u16_le()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_integers() {
        let mut reader = PacketReader::new(&[
            0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12,
        ]);
        assert_eq!(reader.read_u8(), Some(0x42));
        assert_eq!(reader.read_u16_le(), Some(0x1234));
        assert_eq!(reader.read_u24_le(), Some(0x0012_3456));
        assert_eq!(reader.read_u32_le(), Some(0x1234_5678));
        assert_eq!(reader.read_u8(), None);
    }

    #[test]
    fn test_short_reads_do_not_advance() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_u32_le(), None);
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.read_u16_le(), Some(0x0201));
    }

    #[test]
    fn test_lenenc_int_widths() {
        assert_eq!(PacketReader::new(&[0x42]).read_lenenc_int(), Some(0x42));
        assert_eq!(
            PacketReader::new(&[0xFC, 0x34, 0x12]).read_lenenc_int(),
            Some(0x1234)
        );
        assert_eq!(
            PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]).read_lenenc_int(),
            Some(0x0012_3456)
        );
        assert_eq!(
            PacketReader::new(&[0xFE, 1, 2, 3, 4, 5, 6, 7, 8]).read_lenenc_int(),
            Some(0x0807_0605_0403_0201)
        );
        assert_eq!(PacketReader::new(&[0xFB]).read_lenenc_int(), None);
    }

    #[test]
    fn test_strings() {
        let mut reader = PacketReader::new(b"8.0.36\0\x05hello tail");
        assert_eq!(reader.read_null_string(), Some("8.0.36".to_string()));
        assert_eq!(reader.read_lenenc_string(), Some("hello".to_string()));
        assert_eq!(reader.read_rest(), b" tail");
        assert_eq!(reader.read_rest(), b"");

        let mut reader = PacketReader::new(b"unterminated");
        assert_eq!(reader.read_null_string(), Some("unterminated".to_string()));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_parse_ok_packet() {
        let mut reader = PacketReader::new(&[0x00, 0x01, 0x2A, 0x02, 0x00, 0x00, 0x00]);
        let ok = reader.parse_ok_packet().unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 42);
        assert_eq!(ok.status_flags, 2);
        assert_eq!(ok.warnings, 0);
    }

    #[test]
    fn test_parse_err_packet() {
        let mut data = vec![0xFF, 0x15, 0x04, b'#'];
        data.extend_from_slice(b"28000Access denied");
        let err = PacketReader::new(&data).parse_err_packet().unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.error_message, "Access denied");
    }

    #[test]
    fn test_parse_eof_packet() {
        let eof = PacketReader::new(&[0xFE, 0x01, 0x00, 0x02, 0x00])
            .parse_eof_packet()
            .unwrap();
        assert_eq!(eof.warnings, 1);
        assert_eq!(eof.status_flags, 2);
    }

    #[test]
    fn test_result_set_terminator_as_ok() {
        // CLIENT_DEPRECATE_EOF: OK body behind a 0xFE header, zero affected rows
        let ok = PacketReader::new(&[0xFE, 0x00, 0x00, 0x22, 0x00, 0x03, 0x00])
            .parse_ok_packet()
            .unwrap();
        assert_eq!(ok.affected_rows, 0);
        assert_eq!(ok.status_flags, 0x22);
        assert_eq!(ok.warnings, 3);
        assert!(PacketReader::new(&[0x01, 0x00]).parse_ok_packet().is_none());
    }
}
