//! Cursor over a packet payload.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{EofPacket, ErrPacket, OkPacket};

/// Reads protocol integers and strings from a payload.
///
/// Every read returns `None` when the payload is too short, leaving the
/// cursor where it was.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn skip(&mut self, n: usize) -> bool {
        self.read_bytes(n).is_some()
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u24_le(&mut self) -> Option<u32> {
        self.read_array::<3>()
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Length-encoded integer. `0xFB` (NULL) and `0xFF` are not integers
    /// and yield `None`.
    pub fn read_lenenc_int(&mut self) -> Option<u64> {
        let start = self.pos;
        let value = match self.read_u8()? {
            b @ 0x00..=0xFA => Some(u64::from(b)),
            0xFC => self.read_u16_le().map(u64::from),
            0xFD => self.read_u24_le().map(u64::from),
            0xFE => self.read_u64_le(),
            0xFB | 0xFF => None,
        };
        if value.is_none() {
            self.pos = start;
        }
        value
    }

    pub fn read_lenenc_bytes(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        let len = self.read_lenenc_int()?;
        let bytes = usize::try_from(len).ok().and_then(|n| self.read_bytes(n));
        if bytes.is_none() {
            self.pos = start;
        }
        bytes
    }

    pub fn read_lenenc_string(&mut self) -> Option<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// A text-protocol column value: `Some(None)` for the `0xFB` NULL
    /// marker, `Some(Some(bytes))` otherwise.
    pub fn read_text_cell(&mut self) -> Option<Option<&'a [u8]>> {
        if self.peek()? == 0xFB {
            self.pos += 1;
            return Some(None);
        }
        self.read_lenenc_bytes().map(Some)
    }

    /// String up to the next NUL, which is consumed. A missing terminator
    /// reads to the end of the payload.
    pub fn read_null_string(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos = (self.pos + len + 1).min(self.data.len());
        Some(s)
    }

    pub fn read_string(&mut self, len: usize) -> Option<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    /// OK packet body; the leading `0x00` (or `0xFE` when it terminates a
    /// result set) is skipped if still present.
    pub fn parse_ok_packet(&mut self) -> Option<OkPacket> {
        if matches!(self.peek(), Some(0x00 | 0xFE)) {
            self.pos += 1;
        }
        let affected_rows = self.read_lenenc_int()?;
        let last_insert_id = self.read_lenenc_int()?;
        let status_flags = self.read_u16_le().unwrap_or_default();
        let warnings = self.read_u16_le().unwrap_or_default();
        let info = self.read_rest_string();
        Some(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    pub fn parse_err_packet(&mut self) -> Option<ErrPacket> {
        if self.peek() == Some(0xFF) {
            self.pos += 1;
        }
        let error_code = self.read_u16_le()?;
        let sql_state = if self.peek() == Some(b'#') {
            self.pos += 1;
            self.read_string(5)?
        } else {
            String::new()
        };
        Some(ErrPacket {
            error_code,
            sql_state,
            error_message: self.read_rest_string(),
        })
    }

    pub fn parse_eof_packet(&mut self) -> Option<EofPacket> {
        if self.peek() == Some(0xFE) {
            self.pos += 1;
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
    fn fixed_width_integers() {
        let data = [
            0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 1, 2, 3, 4, 5, 6, 7, 8,
        ];
        let mut r = PacketReader::new(&data);
        assert_eq!(r.read_u8(), Some(0x42));
        assert_eq!(r.read_u16_le(), Some(0x1234));
        assert_eq!(r.read_u24_le(), Some(0x0012_3456));
        assert_eq!(r.read_u32_le(), Some(0x1234_5678));
        assert_eq!(r.read_u64_le(), Some(0x0807_0605_0403_0201));
        assert!(r.is_empty());
        assert_eq!(r.read_u8(), None);
    }

    #[test]
    fn short_read_does_not_advance() {
        let mut r = PacketReader::new(&[0xFC, 0x01]);
        assert_eq!(r.read_lenenc_int(), None);
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.read_u32_le(), None);
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn lenenc_integers() {
        assert_eq!(PacketReader::new(&[0xFA]).read_lenenc_int(), Some(250));
        assert_eq!(
            PacketReader::new(&[0xFC, 0x34, 0x12]).read_lenenc_int(),
            Some(0x1234)
        );
        assert_eq!(
            PacketReader::new(&[0xFD, 0x56, 0x34, 0x12]).read_lenenc_int(),
            Some(0x0012_3456)
        );
        assert_eq!(
            PacketReader::new(&[0xFE, 1, 0, 0, 0, 0, 0, 0, 0]).read_lenenc_int(),
            Some(1)
        );
        assert_eq!(PacketReader::new(&[0xFB]).read_lenenc_int(), None);
    }

    #[test]
    fn text_cells() {
        let data = [0x01, b'1', 0xFB, 0x0B, b'h', b'e', b'l', b'l', b'o', b' ', b'w', b'o', b'r', b'l', b'd'];
        let mut r = PacketReader::new(&data);
        assert_eq!(r.read_text_cell(), Some(Some(&b"1"[..])));
        assert_eq!(r.read_text_cell(), Some(None));
        assert_eq!(r.read_text_cell(), Some(Some(&b"hello world"[..])));
        assert_eq!(r.read_text_cell(), None);
    }

    #[test]
    fn strings() {
        let mut r = PacketReader::new(b"8.0.36\0\x05table");
        assert_eq!(r.read_null_string().as_deref(), Some("8.0.36"));
        assert_eq!(r.read_lenenc_string().as_deref(), Some("table"));

        let mut r = PacketReader::new(b"unterminated");
        assert_eq!(r.read_null_string().as_deref(), Some("unterminated"));
        assert!(r.is_empty());
    }

    #[test]
    fn ok_packet_after_insert() {
        // affected_rows=1, last_insert_id=1, status=IN_TRANS, warnings=0
        let data = [0x00, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00];
        let ok = PacketReader::new(&data).parse_ok_packet().unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 1);
        assert!(ok.in_transaction());
        assert_eq!(ok.warnings, 0);
        assert!(ok.info.is_empty());
    }

    #[test]
    fn err_packet() {
        let mut data = vec![0xFF, 0x7A, 0x04, b'#'];
        data.extend_from_slice(b"42S02");
        data.extend_from_slice(b"Table 'testdb.table_2' doesn't exist");
        let err = PacketReader::new(&data).parse_err_packet().unwrap();
        assert_eq!(err.error_code, 1146);
        assert_eq!(err.sql_state, "42S02");
        assert_eq!(err.error_message, "Table 'testdb.table_2' doesn't exist");
    }

    #[test]
    fn eof_packet() {
        let eof = PacketReader::new(&[0xFE, 0x00, 0x00, 0x02, 0x00])
            .parse_eof_packet()
            .unwrap();
        assert_eq!(eof.warnings, 0);
        assert_eq!(eof.status_flags, 2);
    }
}
