//! Streaming result sets.
//!
//! Rows are pulled one at a time with [`ResultSet::get_row`] (or through the
//! `Iterator` impl). A command may produce several result sets; once the
//! current one is exhausted, [`ResultSet::next_result`] moves to the next.

use std::sync::Arc;

use mywire_core::error::ProtocolError;
use mywire_core::{Error, Result, Row, UsageErrorKind, Value};

use crate::catalog::FieldList;
use crate::connector::Connector;
use crate::protocol::{OkPacket, PacketReader, server_status};
use crate::session::{Pending, ResultHeader, RowEvent, Session};
use crate::types::{decode_binary_value, decode_text_value};

/// Counters reported by the server for one result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultStatus {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warning_count: u16,
    pub status_flags: u16,
    /// Human-readable info from the OK packet
    pub info: String,
}

impl ResultStatus {
    fn from_ok(ok: OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warning_count: ok.warnings,
            status_flags: ok.status_flags,
            info: ok.info,
        }
    }
}

/// One result of a query or statement execution.
///
/// Holds the session mutably until dropped. Dropping it before the rows are
/// read leaves the session busy; call [`Session::drain`] or read to the end.
#[derive(Debug)]
pub struct ResultSet<'s, C: Connector> {
    session: &'s mut Session<C>,
    fields: Arc<FieldList>,
    binary: bool,
    exhausted: bool,
    status: ResultStatus,
}

impl<'s, C: Connector> ResultSet<'s, C> {
    /// Read the response header of a command that was just sent.
    #[allow(clippy::result_large_err)]
    pub(crate) fn start(session: &'s mut Session<C>, binary: bool) -> Result<Self> {
        let header = session.read_result_header(binary)?;
        let mut result = Self {
            session,
            fields: Arc::new(FieldList::empty()),
            binary,
            exhausted: true,
            status: ResultStatus::default(),
        };
        result.apply_header(header);
        Ok(result)
    }

    fn apply_header(&mut self, header: ResultHeader) {
        match header {
            ResultHeader::Ok(ok) => {
                self.fields = Arc::new(FieldList::empty());
                self.exhausted = true;
                self.status = ResultStatus::from_ok(ok);
            }
            ResultHeader::Fields(fields) => {
                self.fields = fields;
                self.exhausted = false;
                self.status = ResultStatus::default();
            }
        }
    }

    /// Next row of the current result, or `None` at its end.
    #[allow(clippy::result_large_err)]
    pub fn get_row(&mut self) -> Result<Option<Row>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.session.next_row_packet() {
            Ok(RowEvent::Row(packet)) => {
                let row = decode_row(&packet, &self.fields, self.binary);
                let row = self.session.check(row);
                if row.is_err() {
                    self.exhausted = true;
                }
                row.map(Some)
            }
            Ok(RowEvent::End(end)) => {
                self.exhausted = true;
                self.status.warning_count = end.warnings;
                self.status.status_flags = end.status_flags;
                if let Some(ok) = end.ok {
                    self.status.affected_rows = ok.affected_rows;
                    self.status.last_insert_id = ok.last_insert_id;
                    self.status.info = ok.info;
                }
                Ok(None)
            }
            Err(e) => {
                self.exhausted = true;
                Err(e)
            }
        }
    }

    /// Collect the remaining rows of the current result.
    #[allow(clippy::result_large_err)]
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.get_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Discard the remaining rows of the current result.
    #[allow(clippy::result_large_err)]
    pub fn discard_rows(&mut self) -> Result<()> {
        while !self.exhausted {
            match self.session.next_row_packet() {
                Ok(RowEvent::Row(_)) => {}
                Ok(RowEvent::End(end)) => {
                    self.exhausted = true;
                    self.status.warning_count = end.warnings;
                    self.status.status_flags = end.status_flags;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Advance to the next result of the same command.
    ///
    /// Returns `false` when the server reported no further results. Fails
    /// with `ResultNotExhausted` while rows of the current result are unread.
    #[allow(clippy::result_large_err)]
    pub fn next_result(&mut self) -> Result<bool> {
        if !self.exhausted {
            return Err(Error::usage(
                UsageErrorKind::ResultNotExhausted,
                "read or discard the current rows before moving to the next result",
            ));
        }
        let Pending::MoreResults { binary } = *self.session.pending() else {
            return Ok(false);
        };
        let header = self.session.read_result_header(binary)?;
        self.binary = binary;
        self.apply_header(header);
        Ok(true)
    }

    /// Discard this and every chained result, leaving the session idle.
    #[allow(clippy::result_large_err)]
    pub fn end(self) -> Result<()> {
        self.session.drain()
    }

    /// Did the server announce another result after this one?
    pub fn more_results_exist(&self) -> bool {
        matches!(self.session.pending(), Pending::MoreResults { .. })
            || self.status.status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0
    }

    pub fn fields(&self) -> &FieldList {
        &self.fields
    }

    /// Index of a column by name; the last one wins on duplicates.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.index_of(name)
    }

    /// Does this result carry rows (as opposed to a bare OK)?
    pub fn has_rows(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn status(&self) -> &ResultStatus {
        &self.status
    }

    pub fn affected_rows(&self) -> u64 {
        self.status.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.status.last_insert_id
    }

    /// Warning count; for row results it is known once the rows are read.
    pub fn warning_count(&self) -> u16 {
        self.status.warning_count
    }

    pub fn status_flags(&self) -> u16 {
        self.status.status_flags
    }

    pub fn info(&self) -> &str {
        &self.status.info
    }
}

impl<C: Connector> Iterator for ResultSet<'_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_row().transpose()
    }
}

/// Decode one row packet with the text or binary codec.
#[allow(clippy::result_large_err)]
pub(crate) fn decode_row(packet: &[u8], fields: &FieldList, binary: bool) -> Result<Row> {
    if binary {
        decode_binary_row(packet, fields)
    } else {
        decode_text_row(packet, fields)
    }
}

/// Text rows: one length-encoded string (or 0xFB for NULL) per column.
#[allow(clippy::result_large_err)]
pub(crate) fn decode_text_row(packet: &[u8], fields: &FieldList) -> Result<Row> {
    let mut reader = PacketReader::new(packet);
    let values = (0..fields.len())
        .map(|i| {
            reader
                .read_lenenc_bytes_or_null()
                .map(decode_text_value)
                .ok_or_else(|| row_error(format!("text row truncated at column {}", i), packet))
        })
        .collect::<Result<Vec<Value>>>()?;
    Ok(Row::with_columns(fields.column_info(), values))
}

/// Binary rows: 0x00, a NULL bitmap offset by two bits, then the non-NULL
/// values in column order.
#[allow(clippy::result_large_err)]
pub(crate) fn decode_binary_row(packet: &[u8], fields: &FieldList) -> Result<Row> {
    let mut reader = PacketReader::new(packet);
    if reader.read_u8() != Some(0x00) {
        return Err(row_error("binary row does not start with 0x00".to_string(), packet));
    }
    let bitmap = reader
        .read_bytes((fields.len() + 9) / 8)
        .ok_or_else(|| row_error("binary row NULL bitmap truncated".to_string(), packet))?;

    let mut values = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }
        let value = decode_binary_value(&mut reader, field.field_type, field.is_unsigned())
            .ok_or_else(|| {
                row_error(
                    format!("binary row truncated at column {} ({})", i, field.name),
                    packet,
                )
            })?;
        values.push(value);
    }
    Ok(Row::with_columns(fields.column_info(), values))
}

fn row_error(message: String, packet: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message,
        raw_data: Some(packet.to_vec()),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::column_def;
    use crate::protocol::PacketWriter;
    use crate::types::{FieldType, column_flags};

    fn fields(defs: &[(&str, FieldType, u16)]) -> FieldList {
        let packets: Vec<_> = defs
            .iter()
            .map(|(name, t, flags)| column_def("P", name, *t, *flags, 11))
            .collect();
        FieldList::from_packets(packets.iter().map(Vec::as_slice)).unwrap()
    }

    #[test]
    fn test_text_row_yields_bytes_and_null() {
        let fields = fields(&[("id", FieldType::Long, 0), ("s", FieldType::VarString, 0)]);
        let packet = b"\x0242\xFB";
        let row = decode_text_row(packet, &fields).unwrap();
        assert_eq!(row.get(0), Some(&Value::Bytes(b"42".to_vec())));
        assert_eq!(row.get(1), Some(&Value::Null));
        assert_eq!(row.get_named::<i64>("id").unwrap(), 42);
    }

    #[test]
    fn test_text_row_truncated() {
        let fields = fields(&[("a", FieldType::Long, 0), ("b", FieldType::Long, 0)]);
        let err = decode_text_row(b"\x011", &fields).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("column 1"));
    }

    #[test]
    fn test_binary_row_decodes_with_widening() {
        let fields = fields(&[
            ("i8", FieldType::Tiny, 0),
            ("u32", FieldType::Long, column_flags::UNSIGNED),
            ("s", FieldType::VarString, 0),
        ]);
        let mut w = PacketWriter::new();
        w.write_u8(0);
        w.write_u8(0);
        w.write_u8(0xFF);
        w.write_u32_le(u32::MAX);
        w.write_lenenc_string("dwa");
        let row = decode_binary_row(w.as_bytes(), &fields).unwrap();
        assert_eq!(row.get(0), Some(&Value::Int(-1)));
        assert_eq!(row.get(1), Some(&Value::BigInt(i64::from(u32::MAX))));
        assert_eq!(row.get(2), Some(&Value::Bytes(b"dwa".to_vec())));
    }

    #[test]
    fn test_null_bit_wins_over_not_null_flag() {
        let fields = fields(&[
            ("a", FieldType::Long, column_flags::NOT_NULL),
            ("b", FieldType::Long, column_flags::NOT_NULL),
        ]);
        // Column 0 is NULL: bit 2 of the bitmap.
        let mut w = PacketWriter::new();
        w.write_u8(0);
        w.write_u8(0b0000_0100);
        w.write_u32_le(7);
        let row = decode_binary_row(w.as_bytes(), &fields).unwrap();
        assert!(row.is_null(0));
        assert_eq!(row.get(1), Some(&Value::Int(7)));
    }

    #[test]
    fn test_binary_bitmap_width() {
        // 7 columns need (7 + 9) / 8 = 2 bitmap bytes; all NULL.
        let defs: Vec<_> = ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|n| (*n, FieldType::Long, 0))
            .collect();
        let fields = fields(&defs);
        let row = decode_binary_row(&[0x00, 0xFC, 0x01], &fields).unwrap();
        assert!(row.values().all(Value::is_null));
    }

    #[test]
    fn test_binary_row_truncated_value() {
        let fields = fields(&[("a", FieldType::LongLong, 0)]);
        let err = decode_binary_row(&[0x00, 0x00, 1, 2, 3], &fields).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("column 0"));
    }
}
