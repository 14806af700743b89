//! Core types for the mywire MySQL client.
//!
//! This crate holds the protocol-independent pieces:
//!
//! - `Error` and its payloads, shared by every layer
//! - `Value`, the dynamic column value decoded from rows
//! - `Row` and `ColumnInfo` with typed access through `FromValue`
//! - `Date`, `Datetime`, `Timestamp` and `Time` as MySQL transmits them

pub mod error;
pub mod row;
pub mod temporal;
pub mod value;

pub use error::{
    BindError, BindErrorKind, ConfigError, ConnectionError, ConnectionErrorKind, Error,
    ProtocolError, Result, ServerError, TypeError, UsageError, UsageErrorKind,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use temporal::{Date, Datetime, Time, Timestamp};
pub use value::Value;
