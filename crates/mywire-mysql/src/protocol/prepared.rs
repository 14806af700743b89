//! Prepared statement (binary protocol) messages.
//!
//! # Protocol Flow
//!
//! 1. **Prepare**: COM_STMT_PREPARE with SQL
//!    - Server returns statement ID, param count, column count
//!    - Then param definitions and result column definitions
//!
//! 2. **Long data** (optional): COM_STMT_SEND_LONG_DATA per chunk
//!    - No server response
//!
//! 3. **Execute**: COM_STMT_EXECUTE with statement ID + binary params
//!    - Server returns a binary result set or OK packet
//!
//! 4. **Reset**: COM_STMT_RESET discards accumulated long data
//!    - Server returns OK
//!
//! 5. **Close**: COM_STMT_CLOSE
//!    - No server response
//!
//! The builders here return message payloads; framing happens in
//! [`PacketChannel`](super::PacketChannel).

#![allow(clippy::cast_possible_truncation)]

use super::{Command, PacketWriter};
use crate::bind::{ParamType, ParamValue};
use crate::types::FieldType;

/// Response from COM_STMT_PREPARE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StmtPrepareOk {
    /// Server-assigned statement identifier
    pub statement_id: u32,
    /// Number of result columns (0 for non-SELECT)
    pub num_columns: u16,
    /// Number of `?` placeholders
    pub num_params: u16,
    pub warnings: u16,
}

/// Parse a COM_STMT_PREPARE_OK payload.
///
/// Layout: status (0x00), statement id (u32), columns (u16), params (u16),
/// reserved (1), warnings (u16).
pub fn parse_stmt_prepare_ok(data: &[u8]) -> Option<StmtPrepareOk> {
    if data.len() < 12 || data[0] != 0x00 {
        return None;
    }

    Some(StmtPrepareOk {
        statement_id: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
        num_columns: u16::from_le_bytes([data[5], data[6]]),
        num_params: u16::from_le_bytes([data[7], data[8]]),
        warnings: u16::from_le_bytes([data[10], data[11]]),
    })
}

/// One parameter as it goes into COM_STMT_EXECUTE.
#[derive(Debug, Clone)]
pub struct ExecParam {
    pub value: ParamValue,
    pub param_type: ParamType,
    /// Value already delivered with COM_STMT_SEND_LONG_DATA
    pub long_data: bool,
}

impl ExecParam {
    fn is_null(&self) -> bool {
        !self.long_data && self.value.is_null()
    }

    /// Type byte announced for this parameter.
    ///
    /// Long data with no value type still needs a type that accepts bytes.
    fn wire_type(&self) -> u8 {
        if self.long_data && self.param_type.field_type == FieldType::Null {
            FieldType::Blob as u8
        } else {
            self.param_type.field_type as u8
        }
    }
}

/// COM_STMT_PREPARE payload.
pub fn prepare(sql: &str) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtPrepare, sql.len());
    writer.write_bytes(sql.as_bytes());
    writer.into_bytes()
}

/// COM_STMT_EXECUTE payload.
///
/// Layout: command, statement id, flags (no cursor), iteration count (1),
/// then for a non-empty parameter list: NULL bitmap, new-params-bound flag,
/// one type/flags pair per parameter, and the non-NULL values in order.
/// Long-data parameters are neither NULL nor carry a value.
pub fn execute(statement_id: u32, params: &[ExecParam]) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtExecute, 64);
    writer.write_u32_le(statement_id);
    writer.write_u8(0x00);
    writer.write_u32_le(1);

    if params.is_empty() {
        return writer.into_bytes();
    }

    let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            null_bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    writer.write_bytes(&null_bitmap);

    writer.write_u8(1);
    for param in params {
        writer.write_u8(param.wire_type());
        writer.write_u8(param.param_type.wire_flags());
    }

    for param in params {
        if !param.long_data && !param.value.is_null() {
            param.value.encode(&mut writer);
        }
    }

    writer.into_bytes()
}

/// COM_STMT_SEND_LONG_DATA payload for one chunk.
pub fn send_long_data(statement_id: u32, param_index: u16, data: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtSendLongData, 6 + data.len());
    writer.write_u32_le(statement_id);
    writer.write_u16_le(param_index);
    writer.write_bytes(data);
    writer.into_bytes()
}

/// Header bytes preceding the data in a COM_STMT_SEND_LONG_DATA payload.
pub const LONG_DATA_HEADER_SIZE: usize = 7;

/// COM_STMT_CLOSE payload.
pub fn close(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtClose, 4);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// COM_STMT_RESET payload.
pub fn reset(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::command(Command::StmtReset, 4);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Blob;
    use crate::protocol::MAX_PACKET_SIZE;

    fn param(value: impl Into<ParamValue>) -> ExecParam {
        let value = value.into();
        ExecParam {
            param_type: value.param_type().unwrap(),
            value,
            long_data: false,
        }
    }

    #[test]
    fn test_parse_stmt_prepare_ok() {
        let data = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x05, 0x00,
        ];
        let ok = parse_stmt_prepare_ok(&data).unwrap();
        assert_eq!(ok.statement_id, 1);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 3);
        assert_eq!(ok.warnings, 5);

        assert!(parse_stmt_prepare_ok(&data[..11]).is_none());
        assert!(parse_stmt_prepare_ok(&[0xFF; 12]).is_none());
    }

    #[test]
    fn test_execute_without_params() {
        assert_eq!(execute(7, &[]), vec![0x17, 7, 0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_execute_layout() {
        let payload = execute(1, &[param(42i32), param(ParamValue::Null), param("hi")]);

        assert_eq!(&payload[..10], &[0x17, 1, 0, 0, 0, 0, 1, 0, 0, 0]);
        // bitmap: param 1 is NULL
        assert_eq!(payload[10], 0b0000_0010);
        assert_eq!(payload[11], 1);
        assert_eq!(
            &payload[12..18],
            &[
                FieldType::Long as u8,
                0,
                FieldType::Null as u8,
                0,
                FieldType::String as u8,
                0
            ]
        );
        assert_eq!(&payload[18..22], &42i32.to_le_bytes());
        assert_eq!(&payload[22..], b"\x02hi");
    }

    #[test]
    fn test_execute_unsigned_flag() {
        let payload = execute(1, &[param(u64::MAX)]);
        assert_eq!(&payload[12..14], &[FieldType::LongLong as u8, 0x80]);
        assert_eq!(&payload[14..], &[0xFF; 8]);
    }

    #[test]
    fn test_null_bitmap_spans_bytes() {
        let mut params: Vec<_> = (0..9).map(|i| param(i as i8)).collect();
        params[8] = param(ParamValue::Null);
        let payload = execute(1, &params);
        assert_eq!(&payload[10..12], &[0x00, 0x01]);
    }

    #[test]
    fn test_long_data_param_is_not_null_and_sends_no_value() {
        let mut long = param(ParamValue::Null);
        long.long_data = true;
        let payload = execute(3, &[long, param(1u8)]);

        assert_eq!(payload[10], 0);
        assert_eq!(payload[12], FieldType::Blob as u8);
        assert_eq!(&payload[14..16], &[FieldType::Tiny as u8, 0x80]);
        assert_eq!(&payload[16..], &[1]);
    }

    #[test]
    fn test_execute_big_blob_fills_two_frames() {
        // i32 + lenenc blob; header, bitmap, bound flag, types and the
        // 9-byte length prefix add 29 bytes.
        let blob_len = 2 * MAX_PACKET_SIZE - 29;
        assert_eq!(blob_len, 32 * 1024 * 1024 - 31);
        let payload = execute(1, &[param(7i32), param(Blob(vec![0xAB; blob_len]))]);
        assert_eq!(payload.len(), 2 * MAX_PACKET_SIZE);
    }

    #[test]
    fn test_small_command_payloads() {
        assert_eq!(prepare("SELECT ?"), b"\x16SELECT ?");
        assert_eq!(send_long_data(2, 1, b"abc"), b"\x18\x02\x00\x00\x00\x01\x00abc");
        assert_eq!(close(9), vec![0x19, 9, 0, 0, 0]);
        assert_eq!(reset(9), vec![0x1a, 9, 0, 0, 0]);
        assert_eq!(send_long_data(0, 0, &[]).len(), LONG_DATA_HEADER_SIZE);
    }
}
