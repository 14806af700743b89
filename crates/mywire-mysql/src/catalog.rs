//! Column and parameter metadata.
//!
//! Both query results and prepare responses describe their columns with a
//! run of column-definition packets. [`parse_field_definition`] decodes one
//! packet; [`FieldList`] holds the ordered result together with the shared
//! name lookup rows use.

use std::sync::Arc;

use mywire_core::error::ProtocolError;
use mywire_core::{ColumnInfo, Error, Result};

use crate::protocol::PacketReader;
use crate::types::{FieldType, column_flags};

/// One column (or parameter) definition. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Catalog name (always "def")
    pub catalog: String,
    pub schema: String,
    /// Table name or alias
    pub table: String,
    pub org_table: String,
    /// Column name or alias
    pub name: String,
    pub org_name: String,
    /// Collation id of the column
    pub charset: u16,
    /// Maximum display length in bytes
    pub display_length: u32,
    pub field_type: FieldType,
    /// Bitset of [`column_flags`]
    pub flags: u16,
    /// Decimal scale
    pub scale: u8,
}

impl FieldDescriptor {
    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    pub const fn is_primary_key(&self) -> bool {
        self.flags & column_flags::PRIMARY_KEY != 0
    }

    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    pub const fn is_binary(&self) -> bool {
        self.flags & column_flags::BINARY != 0
    }

    pub const fn is_blob(&self) -> bool {
        self.flags & column_flags::BLOB != 0
    }
}

/// Parse one column-definition (protocol 4.1) packet.
#[allow(clippy::result_large_err)]
pub fn parse_field_definition(data: &[u8]) -> Result<FieldDescriptor> {
    let mut reader = PacketReader::new(data);
    let mut text = |what: &str| {
        reader
            .read_lenenc_string()
            .ok_or_else(|| truncated(what, data))
    };

    let catalog = text("catalog")?;
    let schema = text("schema")?;
    let table = text("table")?;
    let org_table = text("org_table")?;
    let name = text("name")?;
    let org_name = text("org_name")?;

    // Length of the fixed-size block that follows (always 0x0c).
    reader
        .read_lenenc_int()
        .ok_or_else(|| truncated("fixed length", data))?;
    let charset = reader
        .read_u16_le()
        .ok_or_else(|| truncated("charset", data))?;
    let display_length = reader
        .read_u32_le()
        .ok_or_else(|| truncated("display length", data))?;
    let field_type = FieldType::from_u8(
        reader
            .read_u8()
            .ok_or_else(|| truncated("type", data))?,
    );
    let flags = reader
        .read_u16_le()
        .ok_or_else(|| truncated("flags", data))?;
    let scale = reader.read_u8().ok_or_else(|| truncated("scale", data))?;

    Ok(FieldDescriptor {
        catalog,
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        display_length,
        field_type,
        flags,
        scale,
    })
}

fn truncated(what: &str, data: &[u8]) -> Error {
    Error::Protocol(ProtocolError {
        message: format!("column definition truncated at {}", what),
        raw_data: Some(data.to_vec()),
        source: None,
    })
}

/// Ordered field descriptors plus the name lookup shared with rows.
#[derive(Debug, Clone, Default)]
pub struct FieldList {
    fields: Vec<FieldDescriptor>,
    columns: Arc<ColumnInfo>,
}

impl FieldList {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        let columns = Arc::new(ColumnInfo::new(
            fields.iter().map(|f| f.name.clone()).collect(),
        ));
        Self { fields, columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a run of column-definition packets.
    #[allow(clippy::result_large_err)]
    pub fn from_packets<'a, I>(packets: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let fields = packets
            .into_iter()
            .map(parse_field_definition)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    /// Index of the column with this name; the last one wins on duplicates.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.index_of(name)
    }

    /// Column names shared with every row decoded against this list.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }
}

impl<'a> IntoIterator for &'a FieldList {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::PacketWriter;

    /// Build a column definition packet as a server would send it.
    pub(crate) fn column_def(
        table: &str,
        name: &str,
        field_type: FieldType,
        flags: u16,
        display_length: u32,
    ) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_lenenc_string("def");
        w.write_lenenc_string("test");
        w.write_lenenc_string(table);
        w.write_lenenc_string(table);
        w.write_lenenc_string(name);
        w.write_lenenc_string(name);
        w.write_lenenc_int(0x0c);
        w.write_u16_le(33);
        w.write_u32_le(display_length);
        w.write_u8(field_type as u8);
        w.write_u16_le(flags);
        w.write_u8(0);
        w.write_zeros(2);
        w.into_bytes()
    }

    #[test]
    fn test_parse_field_definition() {
        let data = column_def(
            "P",
            "ii",
            FieldType::Long,
            column_flags::NO_DEFAULT_VALUE | column_flags::NOT_NULL,
            11,
        );
        let field = parse_field_definition(&data).unwrap();
        assert_eq!(field.catalog, "def");
        assert_eq!(field.table, "P");
        assert_eq!(field.name, "ii");
        assert_eq!(field.field_type, FieldType::Long);
        assert_eq!(field.display_length, 11);
        assert!(field.is_not_null());
        assert!(!field.is_unsigned());
    }

    #[test]
    fn test_truncated_definition_is_protocol_error() {
        let data = column_def("P", "ss", FieldType::VarString, 0, 60);
        let err = parse_field_definition(&data[..data.len() - 5]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("flags"));
    }

    #[test]
    fn test_field_list_lookup() {
        let packets = [
            column_def("M", "id", FieldType::Long, 0, 11),
            column_def("M", "str", FieldType::VarString, 0, 60),
            column_def("M", "id", FieldType::LongLong, 0, 20),
        ];
        let list = FieldList::from_packets(packets.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.index_of("str"), Some(1));
        assert_eq!(list.index_of("id"), Some(2));
        assert_eq!(list.index_of("nope"), None);
        assert_eq!(list.column_info().names().len(), 3);
        assert!(FieldList::empty().is_empty());
    }
}
