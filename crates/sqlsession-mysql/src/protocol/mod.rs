//! MySQL client/server protocol framing.
//!
//! Every packet starts with a 4-byte header: a 3-byte little-endian payload
//! length followed by a sequence id. Payloads of `MAX_PAYLOAD` bytes or more
//! are split across several packets, terminated by a shorter (possibly
//! empty) one.

pub mod reader;
pub mod writer;

pub use reader::PacketReader;
pub use writer::PacketWriter;

use sqlsession_core::error::QueryErrorKind;

/// Largest payload a single packet can carry (2^24 - 1 bytes).
pub const MAX_PAYLOAD: usize = 0xFF_FF_FF;

/// Capability flags exchanged during the handshake.
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 20;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Flags every connection asks for. `CLIENT_CONNECT_WITH_DB` and
    /// `CLIENT_CONNECT_ATTRS` are added per configuration.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_DEPRECATE_EOF;
}

/// Server status bits carried by OK and EOF packets.
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
}

/// Collation ids used in the handshake response.
pub mod charset {
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
    pub const UTF8MB4_0900_AI_CI: u8 = 255;

    pub const DEFAULT_CHARSET: u8 = UTF8MB4_0900_AI_CI;
}

/// Commands this driver sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    Ping = 0x0e,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_length: u32,
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// What a server response packet is, judged by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Err,
    /// 0xFE with a short payload. A long 0xFE payload is a row or an
    /// auth-switch request, depending on context.
    Eof,
    LocalInfile,
    Other,
}

impl Response {
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            Some(0x00) => Response::Ok,
            Some(0xFF) => Response::Err,
            Some(0xFE) if payload.len() < 9 => Response::Eof,
            Some(0xFB) => Response::LocalInfile,
            _ => Response::Other,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn in_transaction(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0
    }
}

#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Classify the server error code.
    pub fn query_kind(&self) -> QueryErrorKind {
        match self.error_code {
            // ER_DUP_ENTRY, ER_ROW_IS_REFERENCED_2, ER_NO_REFERENCED_ROW_2
            1062 | 1451 | 1452 => QueryErrorKind::Constraint,
            // ER_NO_SUCH_TABLE, ER_BAD_FIELD_ERROR
            1146 | 1054 => QueryErrorKind::NotFound,
            // ER_DBACCESS_DENIED_ERROR, ER_ACCESS_DENIED_ERROR, ER_TABLEACCESS_DENIED_ERROR
            1044 | 1045 | 1142 => QueryErrorKind::Permission,
            // ER_PARSE_ERROR
            1064 => QueryErrorKind::Syntax,
            _ => QueryErrorKind::Database,
        }
    }

    /// Errors that end the handshake because the credentials were refused.
    pub fn is_access_denied(&self) -> bool {
        matches!(self.error_code, 1044 | 1045 | 1698)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes() {
        let header = PacketHeader {
            payload_length: 0x0012_3456,
            sequence_id: 7,
        };
        assert_eq!(header.to_bytes(), [0x56, 0x34, 0x12, 7]);
        assert_eq!(PacketHeader::from_bytes(header.to_bytes()), header);

        #[allow(clippy::cast_possible_truncation)]
        let max = PacketHeader {
            payload_length: MAX_PAYLOAD as u32,
            sequence_id: 255,
        };
        assert_eq!(max.to_bytes(), [0xFF, 0xFF, 0xFF, 255]);
    }

    #[test]
    fn classify_responses() {
        assert_eq!(Response::classify(&[0x00, 0, 0, 2, 0, 0, 0]), Response::Ok);
        assert_eq!(Response::classify(&[0xFF, 0x15, 0x04]), Response::Err);
        assert_eq!(Response::classify(&[0xFE, 0, 0, 2, 0]), Response::Eof);
        assert_eq!(Response::classify(&[0xFE; 20]), Response::Other);
        assert_eq!(Response::classify(&[0xFB, b'f']), Response::LocalInfile);
        assert_eq!(Response::classify(&[0x03, b'd', b'e', b'f']), Response::Other);
        assert_eq!(Response::classify(&[]), Response::Other);
    }

    #[test]
    fn error_codes_map_to_kinds() {
        let err = |code| ErrPacket {
            error_code: code,
            sql_state: "HY000".to_string(),
            error_message: String::new(),
        };
        assert_eq!(err(1062).query_kind(), QueryErrorKind::Constraint);
        assert_eq!(err(1146).query_kind(), QueryErrorKind::NotFound);
        assert_eq!(err(1054).query_kind(), QueryErrorKind::NotFound);
        assert_eq!(err(1142).query_kind(), QueryErrorKind::Permission);
        assert_eq!(err(1064).query_kind(), QueryErrorKind::Syntax);
        assert_eq!(err(1213).query_kind(), QueryErrorKind::Database);
        assert!(err(1045).is_access_denied());
        assert!(!err(1064).is_access_denied());
    }
}
