//! Blocking MySQL native wire-protocol client.
//!
//! This crate implements the MySQL client/server protocol from scratch over
//! any `Read + Write` byte stream. It provides:
//!
//! - Packet framing with sequence numbers and transparent message splitting
//! - Authentication (mysql_native_password, caching_sha2_password)
//! - Text queries with multi-result traversal
//! - Server-side prepared statements with typed parameter binding,
//!   by-reference parameters and long data streaming
//! - Binary and text row decoding into [`Value`]s
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Messages of 16MB or more are split across packets
//! - Request/response pairing via sequence numbers, reset per command
//!
//! # Example
//!
//! ```rust,ignore
//! use mywire_mysql::{MySqlConfig, ParamValue, Session};
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let mut session = Session::connect(config)?;
//! let mut stmt = session.prepare("SELECT id, name FROM users WHERE id > ?")?;
//! let mut rows = stmt.execute(&mut session, &[ParamValue::from(10i32)])?;
//! while let Some(row) = rows.get_row()? {
//!     let name: String = row.get_named("name")?;
//! }
//! ```

pub mod auth;
pub mod bind;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod protocol;
pub mod result;
pub mod session;
pub mod statement;
pub mod types;

pub use bind::{
    Bindable, Binding, Blob, BoundParam, ParamRef, ParamType, ParamValue, Params, Raw,
};
pub use catalog::{FieldDescriptor, FieldList};
pub use config::MySqlConfig;
pub use connector::{Connector, Established, ServerInfo, TcpConnector};
pub use result::{ResultSet, ResultStatus};
pub use session::Session;
pub use statement::{Statement, StatementState};
pub use types::FieldType;

pub use mywire_core::{
    Date, Datetime, Error, FromValue, Result, Row, Time, Timestamp, UsageErrorKind, Value,
};
