//! Cursor over a packet payload.
//!
//! Every read returns `None` when the payload is too short, leaving the
//! caller to decide how to report the truncation.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{EofPacket, ErrPacket, OkPacket};

/// A reader for MySQL protocol data.
#[derive(Debug, Clone)]
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

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Current offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes: [u8; N] = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn read_u24_le(&mut self) -> Option<u32> {
        self.take::<3>()
            .map(|[a, b, c]| u32::from_le_bytes([a, b, c, 0]))
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    pub fn read_f32_le(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }

    pub fn read_f64_le(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }

    /// Read a length-encoded integer.
    ///
    /// - 0x00-0xFA: the value itself
    /// - 0xFC / 0xFD / 0xFE: 2, 3 or 8 byte value follows
    /// - 0xFB: NULL, 0xFF: invalid; both yield `None`
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        match self.read_u8()? {
            first @ 0x00..=0xFA => Some(u64::from(first)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => None,
        }
    }

    /// Read a length-encoded byte string.
    pub fn read_lenenc_bytes(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_lenenc_int()?).ok()?;
        self.read_bytes(len)
    }

    /// Read a length-encoded byte string that may be the NULL marker (0xFB).
    ///
    /// Outer `None` means truncation; `Some(None)` means SQL NULL.
    pub fn read_lenenc_bytes_or_null(&mut self) -> Option<Option<&'a [u8]>> {
        if self.peek()? == 0xFB {
            self.pos += 1;
            return Some(None);
        }
        self.read_lenenc_bytes().map(Some)
    }

    /// Read a length-encoded string, replacing invalid UTF-8.
    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read a NUL-terminated string; a missing terminator consumes the rest.
    pub fn read_null_string(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += (end + 1).min(rest.len());
        Some(s)
    }

    pub fn read_string(&mut self, len: usize) -> Option<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }

    /// Skip `n` bytes; returns false (without moving) if too few remain.
    pub fn skip(&mut self, n: usize) -> bool {
        if self.remaining() >= n {
            self.pos += n;
            true
        } else {
            false
        }
    }

    /// Parse an OK packet.
    ///
    /// Accepts both the 0x00 header and the 0xFE header that terminates rows
    /// under CLIENT_DEPRECATE_EOF.
    pub fn parse_ok_packet(&mut self) -> Option<OkPacket> {
        if matches!(self.peek(), Some(0x00 | 0xFE)) {
            self.skip(1);
        }

        let affected_rows = self.read_lenenc_int()?;
        let last_insert_id = self.read_lenenc_int()?;
        let status_flags = self.read_u16_le()?;
        let warnings = self.read_u16_le()?;
        let info = self.read_rest_string();

        Some(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    /// Parse an ERR packet: 0xFF, code, optional `#` + SQLSTATE, message.
    pub fn parse_err_packet(&mut self) -> Option<ErrPacket> {
        if self.peek() == Some(0xFF) {
            self.skip(1);
        }

        let error_code = self.read_u16_le()?;
        let sql_state = if self.peek() == Some(b'#') {
            self.skip(1);
            Some(self.read_string(5)?)
        } else {
            None
        };
        let error_message = self.read_rest_string();

        Some(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }

    /// Parse an EOF packet: 0xFE, warnings, status flags.
    ///
    /// A bare 0xFE (pre-4.1 servers) yields zeroed fields.
    pub fn parse_eof_packet(&mut self) -> Option<EofPacket> {
        if self.peek() == Some(0xFE) {
            self.skip(1);
        }
        if self.is_empty() {
            return Some(EofPacket::default());
        }

        let warnings = self.read_u16_le()?;
        let status_flags = self.read_u16_le()?;

        Some(EofPacket {
            warnings,
            status_flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let data = [
            0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12,
        ];
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.read_u8(), Some(0x42));
        assert_eq!(reader.read_u16_le(), Some(0x1234));
        assert_eq!(reader.read_u24_le(), Some(0x0012_3456));
        assert_eq!(reader.read_u32_le(), Some(0x1234_5678));
        assert_eq!(reader.read_u8(), None);
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(reader.read_u32_le(), None);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_bytes(4), None);
        assert!(!reader.skip(4));
        assert_eq!(reader.remaining(), 3);
    }

    #[test]
    fn test_read_lenenc_int() {
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
            PacketReader::new(&[0xFE, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08])
                .read_lenenc_int(),
            Some(0x0807_0605_0403_0201)
        );
        assert_eq!(PacketReader::new(&[0xFB]).read_lenenc_int(), None);
    }

    #[test]
    fn test_lenenc_bytes_or_null() {
        let data = [0xFB, 0x03, b'd', b'w', b'a', 0x05, b'x'];
        let mut reader = PacketReader::new(&data);
        assert_eq!(reader.read_lenenc_bytes_or_null(), Some(None));
        assert_eq!(reader.read_lenenc_bytes_or_null(), Some(Some(&b"dwa"[..])));
        // Declared length runs past the payload.
        assert_eq!(reader.read_lenenc_bytes_or_null(), None);
    }

    #[test]
    fn test_read_null_string() {
        let mut reader = PacketReader::new(b"5.7.44\0rest");
        assert_eq!(reader.read_null_string(), Some("5.7.44".to_string()));
        assert_eq!(reader.read_null_string(), Some("rest".to_string()));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_parse_ok_packet() {
        let data = [0x00, 0x01, 0x2A, 0x02, 0x00, 0x03, 0x00];
        let ok = PacketReader::new(&data).parse_ok_packet().unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 42);
        assert_eq!(ok.status_flags, 2);
        assert_eq!(ok.warnings, 3);
        assert!(ok.info.is_empty());
    }

    #[test]
    fn test_parse_ok_packet_with_eof_header() {
        let data = [0xFE, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00];
        let ok = PacketReader::new(&data).parse_ok_packet().unwrap();
        assert_eq!(ok.status_flags, 0x0A);
    }

    #[test]
    fn test_parse_err_packet() {
        let mut data = vec![0xFF, 0x15, 0x04, b'#'];
        data.extend_from_slice(b"28000");
        data.extend_from_slice(b"Access denied");
        let err = PacketReader::new(&data).parse_err_packet().unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state.as_deref(), Some("28000"));
        assert_eq!(err.error_message, "Access denied");

        let bare = [0xFF, 0x15, 0x04, b'n', b'o'];
        let err = PacketReader::new(&bare).parse_err_packet().unwrap();
        assert_eq!(err.sql_state, None);
        assert_eq!(err.error_message, "no");
    }

    #[test]
    fn test_parse_eof_packet() {
        let data = [0xFE, 0x01, 0x00, 0x0A, 0x00];
        let eof = PacketReader::new(&data).parse_eof_packet().unwrap();
        assert_eq!(eof.warnings, 1);
        assert_eq!(eof.status_flags, 0x0A);

        let bare = PacketReader::new(&[0xFE]).parse_eof_packet().unwrap();
        assert_eq!(bare, EofPacket::default());
    }
}
