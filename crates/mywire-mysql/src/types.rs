//! MySQL wire types and the binary row value codec.
//!
//! Text-protocol rows carry every value as a length-encoded string, so they
//! decode straight to [`Value::Bytes`]. Binary-protocol rows use a per-type
//! layout, decoded here by the column's [`FieldType`].

#![allow(clippy::cast_possible_truncation)]

use mywire_core::{Date, Datetime, Time, Timestamp, Value};

use crate::protocol::PacketReader;

/// MySQL field type codes (`MYSQL_TYPE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    DateTime = 0x0C,
    Year = 0x0D,
    NewDate = 0x0E,
    VarChar = 0x0F,
    Bit = 0x10,
    Timestamp2 = 0x11,
    DateTime2 = 0x12,
    Time2 = 0x13,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl FieldType {
    /// Map a type byte to a known type, or `None` for unassigned codes.
    pub const fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0x11 => FieldType::Timestamp2,
            0x12 => FieldType::DateTime2,
            0x13 => FieldType::Time2,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => return None,
        })
    }

    /// Like [`FieldType::from_wire`], treating unknown codes as strings.
    ///
    /// Used for server-supplied column metadata, where a newer server may
    /// announce a type this client has never heard of.
    pub const fn from_u8(value: u8) -> Self {
        match Self::from_wire(value) {
            Some(t) => t,
            None => FieldType::String,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, FieldType::Float | FieldType::Double)
    }

    pub const fn is_decimal(self) -> bool {
        matches!(self, FieldType::Decimal | FieldType::NewDecimal)
    }

    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::Geometry
        )
    }

    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date
                | FieldType::NewDate
                | FieldType::Time
                | FieldType::Time2
                | FieldType::DateTime
                | FieldType::DateTime2
                | FieldType::Timestamp
                | FieldType::Timestamp2
        )
    }

    /// Fixed value width in the binary protocol, `None` for length-prefixed types.
    pub const fn fixed_width(self) -> Option<u8> {
        match self {
            FieldType::Tiny => Some(1),
            FieldType::Short | FieldType::Year => Some(2),
            FieldType::Long | FieldType::Int24 | FieldType::Float => Some(4),
            FieldType::LongLong | FieldType::Double => Some(8),
            FieldType::Null => Some(0),
            _ => None,
        }
    }

    /// SQL name of the type, for messages.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Decimal | FieldType::NewDecimal => "DECIMAL",
            FieldType::Tiny => "TINYINT",
            FieldType::Short => "SMALLINT",
            FieldType::Long => "INT",
            FieldType::Float => "FLOAT",
            FieldType::Double => "DOUBLE",
            FieldType::Null => "NULL",
            FieldType::Timestamp | FieldType::Timestamp2 => "TIMESTAMP",
            FieldType::LongLong => "BIGINT",
            FieldType::Int24 => "MEDIUMINT",
            FieldType::Date | FieldType::NewDate => "DATE",
            FieldType::Time | FieldType::Time2 => "TIME",
            FieldType::DateTime | FieldType::DateTime2 => "DATETIME",
            FieldType::Year => "YEAR",
            FieldType::VarChar | FieldType::VarString => "VARCHAR",
            FieldType::Bit => "BIT",
            FieldType::Json => "JSON",
            FieldType::Enum => "ENUM",
            FieldType::Set => "SET",
            FieldType::TinyBlob => "TINYBLOB",
            FieldType::MediumBlob => "MEDIUMBLOB",
            FieldType::LongBlob => "LONGBLOB",
            FieldType::Blob => "BLOB",
            FieldType::String => "CHAR",
            FieldType::Geometry => "GEOMETRY",
        }
    }
}

/// Column definition flags.
#[allow(dead_code)]
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
    pub const NO_DEFAULT_VALUE: u16 = 4096;
    pub const ON_UPDATE_NOW: u16 = 8192;
    pub const NUM: u16 = 32768;
}

/// Decode a text-protocol column value.
pub fn decode_text_value(data: Option<&[u8]>) -> Value {
    data.map_or(Value::Null, |b| Value::Bytes(b.to_vec()))
}

/// Decode one non-NULL binary-protocol value at the reader's position.
///
/// Returns `None` if the payload ends before the value does.
pub fn decode_binary_value(
    reader: &mut PacketReader<'_>,
    field_type: FieldType,
    unsigned: bool,
) -> Option<Value> {
    let value = match field_type {
        FieldType::Null => Value::Null,
        FieldType::Tiny => {
            let b = reader.read_u8()?;
            Value::Int(if unsigned {
                i32::from(b)
            } else {
                i32::from(b as i8)
            })
        }
        FieldType::Short | FieldType::Year => {
            let v = reader.read_u16_le()?;
            Value::Int(if unsigned || field_type == FieldType::Year {
                i32::from(v)
            } else {
                i32::from(v as i16)
            })
        }
        FieldType::Long | FieldType::Int24 => {
            let v = reader.read_u32_le()?;
            if unsigned {
                Value::BigInt(i64::from(v))
            } else {
                Value::Int(v as i32)
            }
        }
        FieldType::LongLong => {
            let v = reader.read_u64_le()?;
            if unsigned {
                Value::UBigInt(v)
            } else {
                Value::BigInt(v as i64)
            }
        }
        FieldType::Float => Value::Float(reader.read_f32_le()?),
        FieldType::Double => Value::Double(reader.read_f64_le()?),
        FieldType::Date | FieldType::NewDate => Value::Date(decode_datetime(reader)?.date()),
        FieldType::DateTime | FieldType::DateTime2 => Value::Datetime(decode_datetime(reader)?),
        FieldType::Timestamp | FieldType::Timestamp2 => {
            Value::Timestamp(Timestamp(decode_datetime(reader)?))
        }
        FieldType::Time | FieldType::Time2 => Value::Time(decode_time(reader)?),
        FieldType::Decimal | FieldType::NewDecimal => {
            Value::Decimal(String::from_utf8_lossy(reader.read_lenenc_bytes()?).into_owned())
        }
        FieldType::Json => {
            let data = reader.read_lenenc_bytes()?;
            serde_json::from_slice(data).map_or_else(|_| Value::Bytes(data.to_vec()), Value::Json)
        }
        _ => Value::Bytes(reader.read_lenenc_bytes()?.to_vec()),
    };
    Some(value)
}

/// Length byte then year(2) month day [hour minute second [micros(4)]].
///
/// Length 0 is the all-zero value.
fn decode_datetime(reader: &mut PacketReader<'_>) -> Option<Datetime> {
    let len = usize::from(reader.read_u8()?);
    let mut data = PacketReader::new(reader.read_bytes(len)?);
    let mut dt = Datetime::default();
    if len >= 4 {
        dt.year = data.read_u16_le()? as i16;
        dt.month = data.read_u8()?;
        dt.day = data.read_u8()?;
    }
    if len >= 7 {
        dt.hour = data.read_u8()?;
        dt.minute = data.read_u8()?;
        dt.second = data.read_u8()?;
    }
    if len >= 11 {
        let micros = data.read_u32_le()?;
        if micros >= 1_000_000 {
            return None;
        }
        dt.nanosecond = micros * 1000;
    }
    Some(dt)
}

/// Length byte then sign days(4) hour minute second [micros(4)].
fn decode_time(reader: &mut PacketReader<'_>) -> Option<Time> {
    let len = usize::from(reader.read_u8()?);
    let mut data = PacketReader::new(reader.read_bytes(len)?);
    if len < 8 {
        return Some(Time::default());
    }
    let negative = data.read_u8()? != 0;
    let days = data.read_u32_le()?;
    let hours = data.read_u8()?;
    let minutes = data.read_u8()?;
    let seconds = data.read_u8()?;
    let micros = if len >= 12 { data.read_u32_le()? } else { 0 };
    Time::from_components(negative, days, hours, minutes, seconds, micros)
}

/// Encode a date in the binary temporal layout (length byte included).
pub(crate) fn encode_date(out: &mut crate::protocol::PacketWriter, d: Date) {
    encode_datetime(out, Datetime::from(d));
}

/// Encode a datetime using the shortest of the 0/4/7/11 byte forms.
pub(crate) fn encode_datetime(out: &mut crate::protocol::PacketWriter, dt: Datetime) {
    if dt.is_zero() {
        out.write_u8(0);
        return;
    }
    let len = if dt.nanosecond != 0 {
        11
    } else if dt.has_time() {
        7
    } else {
        4
    };
    out.write_u8(len);
    out.write_u16_le(dt.year as u16);
    out.write_u8(dt.month);
    out.write_u8(dt.day);
    if len >= 7 {
        out.write_u8(dt.hour);
        out.write_u8(dt.minute);
        out.write_u8(dt.second);
    }
    if len == 11 {
        out.write_u32_le(dt.microsecond());
    }
}

/// Encode a duration using the 0/8/12 byte TIME forms.
pub(crate) fn encode_time(out: &mut crate::protocol::PacketWriter, t: Time) {
    let (negative, days, hours, minutes, seconds, micros) = t.components();
    if t.is_zero() {
        out.write_u8(0);
        return;
    }
    out.write_u8(if micros != 0 { 12 } else { 8 });
    out.write_u8(u8::from(negative));
    out.write_u32_le(days);
    out.write_u8(hours);
    out.write_u8(minutes);
    out.write_u8(seconds);
    if micros != 0 {
        out.write_u32_le(micros);
    }
}
