//! Result row representation.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::temporal::{Date, Datetime, Time, Timestamp};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column names shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row of one set points at the same metadata.
/// When two columns share a name, lookup by name resolves to the last one.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create column info from names in column order.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row of a result set.
///
/// Values are positionally aligned with the set's field list; any slot may be
/// [`Value::Null`].
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a row with its own column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a row sharing column metadata with its siblings.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Is the value at `index` NULL? Out-of-range indexes report `false`.
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(Value::is_null)
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Get a typed value by column index.
    #[allow(clippy::result_large_err)]
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            type_error(
                std::any::type_name::<T>(),
                format!(
                    "index {} out of bounds (row has {} columns)",
                    index,
                    self.len()
                ),
            )
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = self.columns.name_at(index).map(str::to_string);
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

fn type_error(expected: &'static str, actual: impl Into<String>) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.into(),
        column: None,
    })
}

/// Conversion from a column [`Value`] into a Rust type.
///
/// Numeric targets accept both binary-protocol integers and the ASCII digits
/// the text protocol delivers.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! impl_from_value_int {
    ($($t:ty => $name:literal, $via:ident;)*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    let v = value
                        .$via()
                        .ok_or_else(|| type_error($name, value.type_name()))?;
                    <$t>::try_from(v)
                        .map_err(|_| type_error($name, format!("value {} out of range", v)))
                }
            }
        )*
    };
}

impl_from_value_int! {
    i8 => "i8", as_i64;
    i16 => "i16", as_i64;
    i32 => "i32", as_i64;
    i64 => "i64", as_i64;
    u8 => "u8", as_u64;
    u16 => "u16", as_u64;
    u32 => "u32", as_u64;
    u64 => "u64", as_u64;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .map(|v| v != 0)
            .ok_or_else(|| type_error("bool", value.type_name()))
    }
}

#[allow(clippy::cast_possible_truncation)]
impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| type_error("f32", value.type_name())),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| type_error("f64", value.type_name()))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| type_error("String", "non-UTF-8 bytes")),
            Value::Decimal(s) => Ok(s.clone()),
            Value::Int(v) => Ok(v.to_string()),
            Value::BigInt(v) => Ok(v.to_string()),
            Value::UBigInt(v) => Ok(v.to_string()),
            Value::Json(v) => Ok(v.to_string()),
            Value::Date(v) => Ok(v.to_string()),
            Value::Datetime(v) => Ok(v.to_string()),
            Value::Timestamp(v) => Ok(v.to_string()),
            Value::Time(v) => Ok(v.to_string()),
            _ => Err(type_error("String", value.type_name())),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Decimal(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(type_error("Vec<u8>", value.type_name())),
        }
    }
}

/// Parse a text-protocol temporal literal.
fn parse_text<T: std::str::FromStr>(value: &Value, expected: &'static str) -> Result<T> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| type_error(expected, value.type_name()))
}

impl FromValue for Date {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::Datetime(dt) => Ok(dt.date()),
            Value::Timestamp(ts) => Ok(ts.0.date()),
            _ => parse_text(value, "Date"),
        }
    }
}

impl FromValue for Datetime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Datetime(dt) => Ok(*dt),
            Value::Timestamp(ts) => Ok(ts.0),
            Value::Date(d) => Ok(Datetime::from(*d)),
            _ => parse_text(value, "Datetime"),
        }
    }
}

impl FromValue for Timestamp {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Datetime(dt) => Ok(Timestamp(*dt)),
            _ => parse_text(value, "Timestamp"),
        }
    }
}

impl FromValue for Time {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Time(t) => Ok(*t),
            _ => parse_text(value, "Time"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Bytes(b) => serde_json::from_slice(b)
                .map_err(|e| type_error("valid JSON", format!("invalid JSON: {}", e))),
            _ => Err(type_error("JSON", value.type_name())),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_row_basic_access() {
        let row = Row::new(
            vec!["id".to_string(), "str".to_string()],
            vec![Value::Int(1), bytes("jeden")],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get_by_name("str"), Some(&bytes("jeden")));
        assert_eq!(row.get_by_name("missing"), None);
        assert!(row.contains_column("id"));
    }

    #[test]
    fn test_row_text_protocol_values() {
        let row = Row::new(
            vec!["id".to_string(), "str".to_string(), "dt".to_string()],
            vec![bytes("2"), bytes("dwa"), bytes("2010-12-12 11:24:00")],
        );

        assert_eq!(row.get_as::<i32>(0).unwrap(), 2);
        assert_eq!(row.get_as::<u64>(0).unwrap(), 2);
        assert_eq!(row.get_named::<String>("str").unwrap(), "dwa");
        assert_eq!(
            row.get_named::<Datetime>("dt").unwrap(),
            Datetime::new(2010, 12, 12, 11, 24, 0)
        );
    }

    #[test]
    fn test_row_type_errors_carry_column() {
        let row = Row::new(vec!["id".to_string()], vec![bytes("not a number")]);

        let err = row.get_named::<i32>("id").unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("id")),
            other => panic!("unexpected error: {other}"),
        }

        let err = row.get_as::<i32>(0).unwrap_err();
        assert!(err.to_string().contains("'id'"));

        assert!(row.get_named::<i32>("missing").is_err());
        assert!(row.get_as::<i32>(99).is_err());
    }

    #[test]
    fn test_integer_range_checks() {
        let row = Row::new(
            vec!["big".to_string(), "neg".to_string()],
            vec![Value::BigInt(70_000), Value::Int(-1)],
        );
        assert!(row.get_as::<i16>(0).is_err());
        assert_eq!(row.get_as::<i32>(0).unwrap(), 70_000);
        assert!(row.get_as::<u32>(1).is_err());
        assert_eq!(row.get_as::<i8>(1).unwrap(), -1);
    }

    #[test]
    fn test_row_null_handling() {
        let row = Row::new(vec!["nullable".to_string()], vec![Value::Null]);

        assert!(row.is_null(0));
        assert!(!row.is_null(5));
        assert_eq!(row.get_named::<Option<i32>>("nullable").unwrap(), None);
        assert!(row.get_named::<i32>("nullable").is_err());
    }

    #[test]
    fn test_duplicate_column_names_resolve_last() {
        let info = ColumnInfo::new(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(info.len(), 3);
        assert_eq!(info.index_of("a"), Some(2));
        assert_eq!(info.index_of("b"), Some(1));
        assert_eq!(info.name_at(0), Some("a"));
    }

    #[test]
    fn test_row_shared_columns() {
        let columns = Arc::new(ColumnInfo::new(vec!["id".to_string()]));
        let row1 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1)]);
        let row2 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(2)]);

        assert!(Arc::ptr_eq(&row1.column_info(), &row2.column_info()));
        assert_eq!(row2.get_named::<i32>("id").unwrap(), 2);
        assert_eq!(row1.into_values(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_from_value_temporal_and_json() {
        let d = Date::new(2011, 12, 13);
        assert_eq!(Date::from_value(&Value::Date(d)).unwrap(), d);
        assert_eq!(Date::from_value(&bytes("2011-12-13")).unwrap(), d);
        assert_eq!(
            Time::from_value(&bytes("-128:03:02")).unwrap(),
            Time::from_hms(128, 3, 2).neg()
        );
        assert_eq!(
            String::from_value(&Value::Datetime(Datetime::new(2010, 12, 12, 11, 24, 0))).unwrap(),
            "2010-12-12 11:24:00"
        );

        let json = serde_json::Value::from_value(&bytes(r#"{"k":1}"#)).unwrap();
        assert_eq!(json["k"], 1);
    }

    #[test]
    fn test_from_value_floats_and_bool() {
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        assert!(!bool::from_value(&bytes("0")).unwrap());
        let from_float = f32::from_value(&Value::Float(1.5)).unwrap();
        assert!((from_float - 1.5).abs() < f32::EPSILON);
        let from_text = f64::from_value(&bytes("2.25")).unwrap();
        assert!((from_text - 2.25).abs() < f64::EPSILON);
    }
}
