//! MySQL wire protocol building blocks.
//!
//! Every message travels in packets with a 4-byte header:
//! - 3 bytes: payload length (little-endian)
//! - 1 byte: sequence number
//!
//! A single packet carries at most 2^24 - 1 bytes. Longer messages are split
//! into consecutive full packets followed by a shorter (possibly empty) one.

pub mod channel;
pub mod prepared;
pub mod reader;
pub mod writer;

pub use channel::PacketChannel;
pub use prepared::{ExecParam, StmtPrepareOk, parse_stmt_prepare_ok};
pub use reader::PacketReader;
pub use writer::PacketWriter;

use mywire_core::ServerError;

/// Maximum payload size for a single MySQL packet (2^24 - 1 bytes).
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL capability flags (client and server).
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities requested unless the caller overrides them.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_TRANSACTIONS
        | CLIENT_MULTI_STATEMENTS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PS_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_LOCAL_FILES
        | CLIENT_DEPRECATE_EOF;
}

/// Command bytes this client sends (COM_xxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Close the connection
    Quit = 0x01,
    /// Switch default database
    InitDb = 0x02,
    /// Text protocol query
    Query = 0x03,
    /// Liveness check
    Ping = 0x0e,
    /// Prepare a statement
    StmtPrepare = 0x16,
    /// Execute a prepared statement
    StmtExecute = 0x17,
    /// Stream one chunk of a parameter value; no response
    StmtSendLongData = 0x18,
    /// Deallocate a prepared statement; no response
    StmtClose = 0x19,
    /// Discard long data accumulated for a statement
    StmtReset = 0x1a,
}

/// MySQL server status flags.
#[allow(dead_code)]
pub mod server_status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_NO_GOOD_INDEX_USED: u16 = 0x0010;
    pub const SERVER_STATUS_NO_INDEX_USED: u16 = 0x0020;
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
    pub const SERVER_PS_OUT_PARAMS: u16 = 0x1000;
}

/// MySQL collation ids used in the handshake.
#[allow(dead_code)]
pub mod charset {
    pub const LATIN1_SWEDISH_CI: u8 = 8;
    pub const UTF8_GENERAL_CI: u8 = 33;
    pub const UTF8MB4_GENERAL_CI: u8 = 45;
    pub const BINARY: u8 = 63;
    pub const UTF8MB4_UNICODE_CI: u8 = 224;

    /// Default collation for new connections (utf8mb4).
    pub const DEFAULT_CHARSET: u8 = UTF8MB4_GENERAL_CI;
}

/// A MySQL packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence number (wraps at 255)
    pub sequence_id: u8,
}

impl PacketHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Classification of a server response by its first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// OK packet (0x00)
    Ok,
    /// Error packet (0xFF)
    Error,
    /// EOF packet (0xFE, payload shorter than 9 bytes)
    Eof,
    /// LOCAL INFILE request (0xFB)
    LocalInfile,
    /// Anything else: a column count or a row
    Data,
}

impl PacketType {
    pub fn from_first_byte(byte: u8, payload_len: usize) -> Self {
        match byte {
            0x00 => PacketType::Ok,
            0xFF => PacketType::Error,
            0xFE if payload_len < 9 => PacketType::Eof,
            0xFB => PacketType::LocalInfile,
            _ => PacketType::Data,
        }
    }

    /// Classify a payload, treating an empty one as data.
    pub fn of(payload: &[u8]) -> Self {
        payload
            .first()
            .map_or(PacketType::Data, |&b| Self::from_first_byte(b, payload.len()))
    }
}

/// Is this payload the end-of-rows marker?
///
/// Without CLIENT_DEPRECATE_EOF rows end with a classic EOF packet. With it,
/// rows end with an OK packet tagged 0xFE, which may be longer than 9 bytes
/// but never reaches a full frame.
pub fn is_row_terminator(payload: &[u8], deprecate_eof: bool) -> bool {
    match payload.first() {
        Some(0xFE) if deprecate_eof => payload.len() < MAX_PACKET_SIZE,
        Some(0xFE) => payload.len() < 9,
        _ => false,
    }
}

/// Parsed OK packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    /// Human-readable info string (e.g. "Rows matched: 1  Changed: 1")
    pub info: String,
}

/// Parsed ERR packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub error_code: u16,
    /// Five character SQLSTATE, absent on pre-4.1 style errors
    pub sql_state: Option<String>,
    pub error_message: String,
}

impl From<ErrPacket> for ServerError {
    fn from(err: ErrPacket) -> Self {
        ServerError {
            code: err.error_code,
            sql_state: err.sql_state,
            message: err.error_message,
        }
    }
}

/// Parsed EOF packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}
