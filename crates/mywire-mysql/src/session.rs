//! A single blocking MySQL session.
//!
//! A [`Session`] owns one framed byte stream and runs one command at a time.
//! Result sets borrow the session mutably, so overlapping commands are
//! rejected at compile time; a result set dropped before its rows are read
//! leaves the session busy until [`Session::drain`] runs.
//!
//! Protocol and connection failures invalidate the session. After one of
//! those, every command fails with a `Disconnected` error until
//! [`Session::reconnect`] succeeds. Server errors (ERR packets) leave the
//! stream in sync and the session usable.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mywire_core::error::{ConnectionError, ConnectionErrorKind, ProtocolError};
use mywire_core::{Error, Result, Row, UsageErrorKind};

use crate::catalog::FieldList;
use crate::config::MySqlConfig;
use crate::connector::{Connector, Established, ServerInfo, TcpConnector};
use crate::protocol::{
    Command, OkPacket, PacketChannel, PacketReader, PacketType, PacketWriter, is_row_terminator,
    server_status,
};
use crate::result::ResultSet;
use crate::statement::Statement;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// What the server still owes us after the last command.
#[derive(Debug, Clone, Default)]
pub(crate) enum Pending {
    #[default]
    Idle,
    /// Rows of the current result set are unread
    Streaming { fields: Arc<FieldList>, binary: bool },
    /// Another result set follows
    MoreResults { binary: bool },
}

/// First response to a query or execute.
#[derive(Debug)]
pub(crate) enum ResultHeader {
    Ok(OkPacket),
    Fields(Arc<FieldList>),
}

/// Summary carried by the packet that ends a run of rows.
#[derive(Debug, Clone, Default)]
pub(crate) struct RowsEnd {
    pub warnings: u16,
    pub status_flags: u16,
    /// Present when rows end with an OK packet
    pub ok: Option<OkPacket>,
}

#[derive(Debug)]
pub(crate) enum RowEvent {
    Row(Vec<u8>),
    End(RowsEnd),
}

/// A connection to one MySQL server.
pub struct Session<C: Connector = TcpConnector> {
    connector: C,
    config: MySqlConfig,
    channel: Option<PacketChannel<C::Stream>>,
    server: ServerInfo,
    status_flags: u16,
    pending: Pending,
    broken: bool,
    closed: bool,
    session_id: u64,
    generation: u64,
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("generation", &self.generation)
            .field("connection_id", &self.server.connection_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("broken", &self.broken)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session<TcpConnector> {
    /// Connect over TCP and authenticate.
    #[allow(clippy::result_large_err)]
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        Self::connect_with(TcpConnector, config)
    }
}

impl<C: Connector> Session<C> {
    /// Connect through a custom [`Connector`].
    #[allow(clippy::result_large_err)]
    pub fn connect_with(connector: C, config: MySqlConfig) -> Result<Self> {
        let mut session = Self {
            connector,
            config,
            channel: None,
            server: ServerInfo::default(),
            status_flags: 0,
            pending: Pending::Idle,
            broken: false,
            closed: false,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        };
        session.establish()?;
        Ok(session)
    }

    #[allow(clippy::result_large_err)]
    fn establish(&mut self) -> Result<()> {
        self.broken = true;
        let Established { mut channel, server } = self.connector.connect(&self.config)?;
        channel.set_max_message_size(self.config.max_packet_size);

        tracing::debug!(
            session = self.session_id,
            connection_id = server.connection_id,
            server_version = %server.server_version,
            "session established"
        );
        self.status_flags = server.status_flags;
        self.server = server;
        self.channel = Some(channel);
        self.pending = Pending::Idle;
        self.broken = false;
        self.closed = false;

        if let Some(names) = self.config.names.clone() {
            self.simple_query(&format!("SET NAMES {}", names))?;
        }
        Ok(())
    }

    /// Drop the current stream and connect again with the same settings.
    ///
    /// Statements prepared before the reconnect are invalidated and must be
    /// prepared again; using them fails with `StatementInvalidated`.
    #[allow(clippy::result_large_err)]
    pub fn reconnect(&mut self) -> Result<()> {
        self.quit();
        self.generation += 1;
        tracing::debug!(
            session = self.session_id,
            generation = self.generation,
            "reconnecting"
        );
        self.establish()
    }

    /// Send COM_QUIT and drop the stream. Calling it again is a no-op.
    #[allow(clippy::result_large_err)]
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending = Pending::Idle;
        self.quit();
        tracing::debug!(session = self.session_id, "session closed");
        Ok(())
    }

    /// Drop the stream, saying goodbye first unless it is broken.
    ///
    /// The server may already be gone, so a failed COM_QUIT is only logged.
    fn quit(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        if self.broken {
            return;
        }
        channel.reset_sequence();
        if let Err(e) = channel.write_packet(&[Command::Quit as u8]) {
            tracing::debug!(session = self.session_id, error = %e, "COM_QUIT failed");
        }
    }

    /// Round trip a COM_PING.
    #[allow(clippy::result_large_err)]
    pub fn ping(&mut self) -> Result<()> {
        self.simple_command(Command::Ping, &[Command::Ping as u8])
            .map(|_| ())
    }

    /// Switch the default database (COM_INIT_DB).
    ///
    /// The new database is also used for later reconnects.
    #[allow(clippy::result_large_err)]
    pub fn use_db(&mut self, database: &str) -> Result<()> {
        let mut writer = PacketWriter::command(Command::InitDb, database.len());
        writer.write_bytes(database.as_bytes());
        self.simple_command(Command::InitDb, writer.as_bytes())?;
        self.config.database = Some(database.to_string());
        Ok(())
    }

    /// Run a text-protocol query and stream its first result.
    #[allow(clippy::result_large_err)]
    pub fn query(&mut self, sql: &str) -> Result<ResultSet<'_, C>> {
        let mut writer = PacketWriter::command(Command::Query, sql.len());
        writer.write_bytes(sql.as_bytes());
        self.send_command(Command::Query, writer.as_bytes())?;
        ResultSet::start(self, false)
    }

    /// Run a query and collect the rows of its first result.
    ///
    /// Any further result sets are read and discarded.
    #[allow(clippy::result_large_err)]
    pub fn query_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        let mut result = self.query(sql)?;
        let rows = result.collect_rows()?;
        result.end()?;
        Ok(rows)
    }

    /// Prepare a statement on this session.
    #[allow(clippy::result_large_err)]
    pub fn prepare(&mut self, sql: &str) -> Result<Statement> {
        Statement::prepare(self, sql)
    }

    /// Read and discard everything the server still owes for the last
    /// command, including chained result sets.
    #[allow(clippy::result_large_err)]
    pub fn drain(&mut self) -> Result<()> {
        loop {
            match self.pending {
                Pending::Idle => return Ok(()),
                Pending::Streaming { .. } => {
                    tracing::debug!(session = self.session_id, "draining rows");
                    while let RowEvent::Row(_) = self.next_row_packet()? {}
                }
                Pending::MoreResults { binary } => {
                    self.read_result_header(binary)?;
                }
            }
        }
    }

    /// Change the message size limit for this and later connections.
    pub fn set_max_packet_size(&mut self, size: usize) {
        self.config.max_packet_size = size;
        if let Some(channel) = self.channel.as_mut() {
            channel.set_max_message_size(size);
        }
    }

    pub fn max_packet_size(&self) -> usize {
        self.channel
            .as_ref()
            .map_or(self.config.max_packet_size, PacketChannel::max_message_size)
    }

    pub fn config(&self) -> &MySqlConfig {
        &self.config
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn server_version(&self) -> &str {
        &self.server.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.server.connection_id
    }

    /// Server status flags from the most recent OK or EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    /// Collation id the server announced.
    pub fn charset(&self) -> u8 {
        self.server.charset
    }

    /// Number of reconnects since the session was created.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Has a protocol or connection failure invalidated this session?
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Is a result stream still waiting to be read?
    pub fn is_busy(&self) -> bool {
        !matches!(self.pending, Pending::Idle)
    }

    pub(crate) fn epoch(&self) -> (u64, u64) {
        (self.session_id, self.generation)
    }

    pub(crate) fn is_usable(&self) -> bool {
        !self.broken && !self.closed && self.channel.is_some()
    }

    pub(crate) fn deprecate_eof(&self) -> bool {
        self.server.deprecate_eof()
    }

    pub(crate) fn pending(&self) -> &Pending {
        &self.pending
    }

    #[allow(clippy::result_large_err)]
    fn ensure_ready(&self) -> Result<()> {
        if self.closed {
            return Err(Error::usage(
                UsageErrorKind::SessionClosed,
                "session has been closed",
            ));
        }
        if self.broken || self.channel.is_none() {
            return Err(disconnected());
        }
        if self.is_busy() {
            return Err(Error::usage(
                UsageErrorKind::ResultStreamBusy,
                "a result stream is still active; read it to the end or drain the session",
            ));
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn channel_mut(&mut self) -> Result<&mut PacketChannel<C::Stream>> {
        if self.broken {
            return Err(disconnected());
        }
        self.channel.as_mut().ok_or_else(disconnected)
    }

    /// Mark the session broken if `result` carries a fatal error.
    #[allow(clippy::result_large_err)]
    pub(crate) fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.invalidate(e);
            }
        }
        result
    }

    fn invalidate(&mut self, err: &Error) {
        if !self.broken {
            tracing::warn!(
                session = self.session_id,
                error = %err,
                "session invalidated; reconnect required"
            );
        }
        self.broken = true;
        self.pending = Pending::Idle;
    }

    /// Start a new command: reset the sequence and write its message.
    #[allow(clippy::result_large_err)]
    pub(crate) fn send_command(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        tracing::debug!(
            session = self.session_id,
            command = ?command,
            len = payload.len(),
            "send command"
        );
        let result = self.channel_mut().and_then(|channel| {
            channel.reset_sequence();
            channel.write_packet(payload)
        });
        self.check(result)
    }

    /// Write a packet continuing the current command's sequence.
    #[allow(clippy::result_large_err)]
    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let result = self
            .channel_mut()
            .and_then(|channel| channel.write_packet(payload));
        self.check(result)
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn read_packet(&mut self) -> Result<Vec<u8>> {
        let result = self.channel_mut().and_then(PacketChannel::read_packet);
        self.check(result)
    }

    /// Build a fatal error for an unexpected packet and invalidate.
    pub(crate) fn protocol_failure(&mut self, message: impl Into<String>, packet: &[u8]) -> Error {
        let err = Error::Protocol(ProtocolError {
            message: message.into(),
            raw_data: Some(packet.to_vec()),
            source: None,
        });
        self.invalidate(&err);
        err
    }

    /// Convert an ERR packet. The server has finished the command.
    pub(crate) fn server_error(&mut self, packet: &[u8]) -> Error {
        self.pending = Pending::Idle;
        match PacketReader::new(packet).parse_err_packet() {
            Some(err) => Error::Server(err.into()),
            None => self.protocol_failure("malformed ERR packet", packet),
        }
    }

    fn finish_result(&mut self, status_flags: u16, binary: bool) {
        self.status_flags = status_flags;
        self.pending = if status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0 {
            Pending::MoreResults { binary }
        } else {
            Pending::Idle
        };
    }

    /// Run a command whose only valid answer is OK.
    #[allow(clippy::result_large_err)]
    fn simple_command(&mut self, command: Command, payload: &[u8]) -> Result<OkPacket> {
        self.send_command(command, payload)?;
        match self.read_result_header(false)? {
            ResultHeader::Ok(ok) => Ok(ok),
            ResultHeader::Fields(_) => Err(self.protocol_failure(
                format!("{:?} returned a result set", command),
                &[],
            )),
        }
    }

    #[allow(clippy::result_large_err)]
    fn simple_query(&mut self, sql: &str) -> Result<()> {
        let mut result = self.query(sql)?;
        result.end()
    }

    /// Read the response header of a query, execute or chained result.
    ///
    /// A LOCAL INFILE request is answered with an empty file and the real
    /// header is read after it.
    #[allow(clippy::result_large_err)]
    pub(crate) fn read_result_header(&mut self, binary: bool) -> Result<ResultHeader> {
        loop {
            let packet = self.read_packet()?;
            match PacketType::of(&packet) {
                PacketType::Ok => {
                    let Some(ok) = PacketReader::new(&packet).parse_ok_packet() else {
                        return Err(self.protocol_failure("malformed OK packet", &packet));
                    };
                    self.finish_result(ok.status_flags, binary);
                    return Ok(ResultHeader::Ok(ok));
                }
                PacketType::Error => return Err(self.server_error(&packet)),
                PacketType::LocalInfile => {
                    tracing::debug!(
                        file = %String::from_utf8_lossy(&packet[1..]),
                        "LOCAL INFILE request answered with an empty file"
                    );
                    self.write_packet(&[])?;
                }
                PacketType::Eof => {
                    return Err(self.protocol_failure("unexpected EOF packet", &packet));
                }
                PacketType::Data => {
                    // Column counts travel as u16 in every other packet.
                    let count = PacketReader::new(&packet)
                        .read_lenenc_int()
                        .filter(|&c| c > 0 && c <= u64::from(u16::MAX));
                    let Some(count) = count.map(|c| c as usize) else {
                        return Err(self.protocol_failure("malformed column count", &packet));
                    };
                    let fields = Arc::new(self.read_field_list(count)?);
                    self.pending = Pending::Streaming {
                        fields: Arc::clone(&fields),
                        binary,
                    };
                    return Ok(ResultHeader::Fields(fields));
                }
            }
        }
    }

    /// Read `count` column definitions and, unless EOF is deprecated, the
    /// EOF packet closing them.
    #[allow(clippy::result_large_err)]
    pub(crate) fn read_field_list(&mut self, count: usize) -> Result<FieldList> {
        let mut packets = Vec::new();
        for _ in 0..count {
            packets.push(self.read_packet()?);
        }
        let fields = FieldList::from_packets(packets.iter().map(Vec::as_slice));
        let fields = self.check(fields)?;

        if count > 0 && !self.deprecate_eof() {
            let eof = self.read_packet()?;
            if PacketType::of(&eof) != PacketType::Eof {
                return Err(self.protocol_failure("expected EOF after column definitions", &eof));
            }
        }
        Ok(fields)
    }

    /// Read the next row packet of the current result set, or its end.
    #[allow(clippy::result_large_err)]
    pub(crate) fn next_row_packet(&mut self) -> Result<RowEvent> {
        let binary = match self.pending {
            Pending::Streaming { binary, .. } => binary,
            _ => return Ok(RowEvent::End(RowsEnd::default())),
        };

        let packet = self.read_packet()?;
        if PacketType::of(&packet) == PacketType::Error {
            return Err(self.server_error(&packet));
        }
        if !is_row_terminator(&packet, self.deprecate_eof()) {
            return Ok(RowEvent::Row(packet));
        }

        let mut reader = PacketReader::new(&packet);
        let end = if self.deprecate_eof() {
            reader.parse_ok_packet().map(|ok| RowsEnd {
                warnings: ok.warnings,
                status_flags: ok.status_flags,
                ok: Some(ok),
            })
        } else {
            reader.parse_eof_packet().map(|eof| RowsEnd {
                warnings: eof.warnings,
                status_flags: eof.status_flags,
                ok: None,
            })
        };
        let Some(end) = end else {
            return Err(self.protocol_failure("malformed end-of-rows packet", &packet));
        };
        self.finish_result(end.status_flags, binary);
        Ok(RowEvent::End(end))
    }
}

fn disconnected() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: "session is not connected; reconnect required".to_string(),
        source: None,
    })
}
