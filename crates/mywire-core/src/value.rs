//! Dynamic column values decoded from result rows.

use serde::{Deserialize, Serialize};

use crate::temporal::{Date, Datetime, Time, Timestamp};

/// A dynamically-typed column value.
///
/// Text-protocol rows always carry [`Value::Bytes`] (or `Null`); binary-protocol
/// rows decode by wire type. Integers widen on decode: every signed type up to
/// 32 bits, plus `u8` and `u16`, becomes `Int`; `u32` and `i64` become
/// `BigInt`; `u64` becomes `UBigInt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// TINY, SHORT, INT24 and LONG (signed), TINY and SHORT (unsigned)
    Int(i32),

    /// LONGLONG, or unsigned LONG
    BigInt(i64),

    /// Unsigned LONGLONG
    UBigInt(u64),

    /// FLOAT
    Float(f32),

    /// DOUBLE
    Double(f64),

    /// DECIMAL / NEWDECIMAL, kept in its textual form
    Decimal(String),

    /// Strings, blobs and everything from the text protocol
    Bytes(Vec<u8>),

    /// JSON column
    Json(serde_json::Value),

    /// DATE
    Date(Date),

    /// DATETIME
    Datetime(Datetime),

    /// TIMESTAMP
    Timestamp(Timestamp),

    /// TIME
    Time(Time),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::UBigInt(_) => "BIGINT UNSIGNED",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Bytes(_) => "BYTES",
            Value::Json(_) => "JSON",
            Value::Date(_) => "DATE",
            Value::Datetime(_) => "DATETIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Time(_) => "TIME",
        }
    }

    /// Try to convert this value to an i64.
    ///
    /// ASCII digits in `Bytes` parse, so text-protocol integers convert too.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            Value::Decimal(s) => s.parse().ok(),
            Value::Bytes(b) => parse_ascii(b),
            _ => None,
        }
    }

    /// Try to convert this value to a u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UBigInt(v) => Some(*v),
            Value::Bytes(b) => parse_ascii(b),
            other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::UBigInt(v) => Some(*v as f64),
            Value::Decimal(s) => s.parse().ok(),
            Value::Bytes(b) => parse_ascii(b),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    ///
    /// Succeeds for decimals and for byte values holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Decimal(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Decimal(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i32::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Bytes(v.into_bytes())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<Datetime> for Value {
    fn from(v: Datetime) -> Self {
        Value::Datetime(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Time> for Value {
    fn from(v: Time) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::from(-5i8), Value::Int(-5));
        assert_eq!(Value::from(300i16), Value::Int(300));
        assert_eq!(Value::from(200u8), Value::Int(200));
        assert_eq!(Value::from(60_000u16), Value::Int(60_000));
        assert_eq!(Value::from(4_000_000_000u32), Value::BigInt(4_000_000_000));
        assert_eq!(Value::from(u64::MAX), Value::UBigInt(u64::MAX));
    }

    #[test]
    fn test_strings_become_bytes() {
        assert_eq!(Value::from("zero"), Value::Bytes(b"zero".to_vec()));
        assert_eq!(Value::from("dwa".to_string()).as_str(), Some("dwa"));
    }

    #[test]
    fn test_text_numerics_parse() {
        let v = Value::Bytes(b"42".to_vec());
        assert_eq!(v.as_i64(), Some(42));
        assert_eq!(v.as_u64(), Some(42));
        assert_eq!(v.as_f64(), Some(42.0));

        let v = Value::Bytes(b"-7".to_vec());
        assert_eq!(v.as_i64(), Some(-7));
        assert_eq!(v.as_u64(), None);

        assert_eq!(Value::Bytes(b"abc".to_vec()).as_i64(), None);
    }

    #[test]
    fn test_unsigned_out_of_range() {
        assert_eq!(Value::UBigInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::UBigInt(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::Int(-1).as_u64(), None);
    }

    #[test]
    fn test_from_option() {
        let some: Value = Some(42i32).into();
        assert_eq!(some, Value::Int(42));

        let none: Value = Option::<i32>::None.into();
        assert!(none.is_null());
        assert_eq!(none.type_name(), "NULL");
    }

    #[test]
    fn test_temporal_values() {
        let d = Date::new(2011, 12, 13);
        assert_eq!(Value::from(d), Value::Date(d));
        assert_eq!(Value::from(Time::from_hms(1, 0, 0)).type_name(), "TIME");
    }
}
