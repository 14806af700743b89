//! Scripted in-memory server for driving sessions without a database.
//!
//! Each connection replays a [`Script`]: the frames the server sends, laid
//! out in advance. Everything the client writes is recorded per connection
//! and can be inspected through [`Wire`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use mywire_core::error::{ConnectionError, ConnectionErrorKind};
use mywire_mysql::protocol::capabilities::{CLIENT_DEPRECATE_EOF, DEFAULT_CLIENT_FLAGS};
use mywire_mysql::protocol::{PacketChannel, PacketWriter};
use mywire_mysql::{Connector, Error, Established, FieldType, MySqlConfig, Result, ServerInfo};

pub const MORE_RESULTS: u16 = 0x0008;
pub const AUTOCOMMIT: u16 = 0x0002;

/// Server frames for one connection.
#[derive(Debug, Default, Clone)]
pub struct Script {
    input: Vec<u8>,
    reject_writes: bool,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response to a single-frame command: sequence ids start at 1.
    pub fn reply(self, packets: &[Vec<u8>]) -> Self {
        self.reply_from(1, packets)
    }

    /// Frames numbered from `seq`, for exchanges that continue a command.
    pub fn reply_from(mut self, seq: u8, packets: &[Vec<u8>]) -> Self {
        let mut seq = seq;
        for payload in packets {
            self.input.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
            self.input.push(seq);
            self.input.extend_from_slice(payload);
            seq = seq.wrapping_add(1);
        }
        self
    }

    /// Every client write fails with a broken pipe, as after a server hangup.
    pub fn reject_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    /// Raw bytes appended verbatim.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.input.extend_from_slice(bytes);
        self
    }
}

/// What the client wrote, per connection.
#[derive(Debug, Default, Clone)]
pub struct Wire {
    connections: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Wire {
    /// Frame payloads written on connection `conn`, in order.
    pub fn frames(&self, conn: usize) -> Vec<Vec<u8>> {
        let connections = self.connections.lock().unwrap();
        let mut raw = connections[conn].as_slice();
        let mut out = Vec::new();
        while raw.len() >= 4 {
            let len = u32::from_le_bytes([raw[0], raw[1], raw[2], 0]) as usize;
            out.push(raw[4..4 + len].to_vec());
            raw = &raw[4 + len..];
        }
        out
    }

    /// Frames whose first byte is `command`.
    pub fn commands(&self, conn: usize, command: u8) -> Vec<Vec<u8>> {
        self.frames(conn)
            .into_iter()
            .filter(|f| f.first() == Some(&command))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

pub struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    wire: Wire,
    index: usize,
    reject_writes: bool,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.reject_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"));
        }
        self.wire.connections.lock().unwrap()[self.index].extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out one scripted stream per connect.
#[derive(Debug)]
pub struct ScriptedConnector {
    scripts: VecDeque<Script>,
    server: ServerInfo,
    wire: Wire,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>) -> (Self, Wire) {
        Self::with_server(scripts, server_info(false))
    }

    pub fn with_server(scripts: Vec<Script>, server: ServerInfo) -> (Self, Wire) {
        let wire = Wire::default();
        (
            Self {
                scripts: scripts.into(),
                server,
                wire: wire.clone(),
            },
            wire,
        )
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&mut self, _config: &MySqlConfig) -> Result<Established<ScriptedStream>> {
        let script = self.scripts.pop_front().ok_or_else(|| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Refused,
                message: "no more scripted connections".to_string(),
                source: None,
            })
        })?;
        let index = {
            let mut connections = self.wire.connections.lock().unwrap();
            connections.push(Vec::new());
            connections.len() - 1
        };
        let stream = ScriptedStream {
            input: Cursor::new(script.input),
            wire: self.wire.clone(),
            index,
            reject_writes: script.reject_writes,
        };
        Ok(Established {
            channel: PacketChannel::new(stream),
            server: self.server.clone(),
        })
    }
}

pub fn server_info(deprecate_eof: bool) -> ServerInfo {
    let mut capabilities = DEFAULT_CLIENT_FLAGS;
    if !deprecate_eof {
        capabilities &= !CLIENT_DEPRECATE_EOF;
    }
    ServerInfo {
        protocol_version: 10,
        server_version: "8.0.36-scripted".to_string(),
        connection_id: 7,
        capabilities,
        charset: 45,
        status_flags: AUTOCOMMIT,
    }
}

pub fn config() -> MySqlConfig {
    MySqlConfig::new().user("test").database("test")
}

// ---- server packet builders ----

pub fn ok(affected_rows: u64, last_insert_id: u64, status: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    w.write_lenenc_int(affected_rows);
    w.write_lenenc_int(last_insert_id);
    w.write_u16_le(status);
    w.write_u16_le(0);
    w.into_bytes()
}

/// Row terminator under CLIENT_DEPRECATE_EOF.
pub fn ok_eof(status: u16, warnings: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFE);
    w.write_lenenc_int(0);
    w.write_lenenc_int(0);
    w.write_u16_le(status);
    w.write_u16_le(warnings);
    w.into_bytes()
}

pub fn err(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFF);
    w.write_u16_le(code);
    w.write_u8(b'#');
    w.write_bytes(state.as_bytes());
    w.write_bytes(message.as_bytes());
    w.into_bytes()
}

pub fn eof(status: u16) -> Vec<u8> {
    eof_with_warnings(status, 0)
}

pub fn eof_with_warnings(status: u16, warnings: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0xFE);
    w.write_u16_le(warnings);
    w.write_u16_le(status);
    w.into_bytes()
}

pub fn column_count(n: u64) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_lenenc_int(n);
    w.into_bytes()
}

pub fn column(table: &str, name: &str, field_type: FieldType, flags: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_lenenc_string("def");
    w.write_lenenc_string("test");
    w.write_lenenc_string(table);
    w.write_lenenc_string(table);
    w.write_lenenc_string(name);
    w.write_lenenc_string(name);
    w.write_lenenc_int(0x0c);
    w.write_u16_le(45);
    w.write_u32_le(255);
    w.write_u8(field_type as u8);
    w.write_u16_le(flags);
    w.write_u8(0);
    w.write_zeros(2);
    w.into_bytes()
}

pub fn text_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut w = PacketWriter::new();
    for value in values {
        match value {
            Some(v) => w.write_lenenc_string(v),
            None => w.write_u8(0xFB),
        }
    }
    w.into_bytes()
}

/// Binary row from pre-encoded values; `None` sets the NULL bit.
pub fn binary_row(values: &[Option<Vec<u8>>]) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    let mut bitmap = vec![0u8; (values.len() + 9) / 8];
    for (i, v) in values.iter().enumerate() {
        if v.is_none() {
            let bit = i + 2;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    w.write_bytes(&bitmap);
    for v in values.iter().flatten() {
        w.write_bytes(v);
    }
    w.into_bytes()
}

pub fn prepare_ok(statement_id: u32, columns: u16, params: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(0x00);
    w.write_u32_le(statement_id);
    w.write_u16_le(columns);
    w.write_u16_le(params);
    w.write_u8(0);
    w.write_u16_le(0);
    w.into_bytes()
}

/// Full prepare response with classic EOF packets.
pub fn prepare_response(
    statement_id: u32,
    params: &[Vec<u8>],
    columns: &[Vec<u8>],
) -> Vec<Vec<u8>> {
    let mut out = vec![prepare_ok(
        statement_id,
        columns.len() as u16,
        params.len() as u16,
    )];
    if !params.is_empty() {
        out.extend(params.iter().cloned());
        out.push(eof(AUTOCOMMIT));
    }
    if !columns.is_empty() {
        out.extend(columns.iter().cloned());
        out.push(eof(AUTOCOMMIT));
    }
    out
}

pub fn param() -> Vec<u8> {
    column("", "?", FieldType::VarString, 0)
}

/// Parse the parameter section of a COM_STMT_EXECUTE payload:
/// (null bitmap, [(type, flags)], value bytes).
pub fn split_execute(payload: &[u8], params: usize) -> (Vec<u8>, Vec<(u8, u8)>, Vec<u8>) {
    assert_eq!(payload[0], 0x17);
    let bitmap_len = (params + 7) / 8;
    let bitmap = payload[10..10 + bitmap_len].to_vec();
    let types_at = 10 + bitmap_len + 1;
    assert_eq!(payload[types_at - 1], 1, "new-params-bound flag");
    let types = (0..params)
        .map(|i| (payload[types_at + 2 * i], payload[types_at + 2 * i + 1]))
        .collect();
    let values = payload[types_at + 2 * params..].to_vec();
    (bitmap, types, values)
}
