//! Server-side prepared statements.
//!
//! A [`Statement`] is a handle to a statement id on one connection of one
//! session. It does not borrow the session; every operation takes the
//! session explicitly. After the session reconnects, the id is gone on the
//! server and the handle fails with `StatementInvalidated`.

use std::io::Read;
use std::sync::Arc;

use mywire_core::{Error, Result, Row, UsageErrorKind};

use crate::bind::{Binding, BoundParam, ParamValue, Params, bind_all, with_position};
use crate::catalog::FieldList;
use crate::connector::Connector;
use crate::protocol::prepared::{self, ExecParam, LONG_DATA_HEADER_SIZE};
use crate::protocol::{Command, PacketType, parse_stmt_prepare_ok};
use crate::result::ResultSet;
use crate::session::{ResultHeader, Session};

/// Lifecycle of a statement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Prepared, no parameters bound yet
    Prepared,
    /// Parameter slots are bound
    Bound,
    /// Closed; every operation fails with `StatementClosed`
    Closed,
}

/// A prepared statement.
#[derive(Debug)]
pub struct Statement {
    id: u32,
    sql: String,
    params: FieldList,
    fields: Arc<FieldList>,
    param_count: usize,
    warning_count: u16,
    slots: Vec<BoundParam>,
    /// Parameters that received long data since the last execute
    long_data: Vec<bool>,
    state: StatementState,
    /// (session id, generation) the statement was prepared on
    epoch: (u64, u64),
}

impl Statement {
    /// Send COM_STMT_PREPARE and read the parameter and column metadata.
    #[allow(clippy::result_large_err)]
    pub(crate) fn prepare<C: Connector>(session: &mut Session<C>, sql: &str) -> Result<Self> {
        session.send_command(Command::StmtPrepare, &prepared::prepare(sql))?;

        let packet = session.read_packet()?;
        match PacketType::of(&packet) {
            PacketType::Ok => {}
            PacketType::Error => {
                return Err(match session.server_error(&packet) {
                    Error::Server(e) => Error::Prepare(e),
                    other => other,
                });
            }
            _ => {
                return Err(
                    session.protocol_failure("unexpected response to COM_STMT_PREPARE", &packet)
                );
            }
        }
        let Some(ok) = parse_stmt_prepare_ok(&packet) else {
            return Err(session.protocol_failure("malformed COM_STMT_PREPARE_OK", &packet));
        };

        let params = session.read_field_list(usize::from(ok.num_params))?;
        let fields = session.read_field_list(usize::from(ok.num_columns))?;

        tracing::debug!(
            statement_id = ok.statement_id,
            params = ok.num_params,
            columns = ok.num_columns,
            "statement prepared"
        );

        let param_count = usize::from(ok.num_params);
        Ok(Self {
            id: ok.statement_id,
            sql: sql.to_string(),
            params,
            fields: Arc::new(fields),
            param_count,
            warning_count: ok.warnings,
            slots: Vec::new(),
            long_data: vec![false; param_count],
            state: StatementState::Prepared,
            epoch: session.epoch(),
        })
    }

    /// Server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Parameter metadata as announced by the server.
    pub fn params(&self) -> &FieldList {
        &self.params
    }

    /// Result column metadata; empty for statements without rows.
    pub fn fields(&self) -> &FieldList {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Warnings raised while preparing.
    pub fn warning_count(&self) -> u16 {
        self.warning_count
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == StatementState::Closed
    }

    /// Currently bound parameter slots.
    pub fn bound(&self) -> &[BoundParam] {
        &self.slots
    }

    #[allow(clippy::result_large_err)]
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::usage(
                UsageErrorKind::StatementClosed,
                format!("statement {} is closed", self.id),
            ));
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn ensure_current<C: Connector>(&self, session: &Session<C>) -> Result<()> {
        self.ensure_open()?;
        if session.epoch() != self.epoch {
            return Err(Error::usage(
                UsageErrorKind::StatementInvalidated,
                format!(
                    "statement {} belongs to an earlier connection; prepare it again",
                    self.id
                ),
            ));
        }
        Ok(())
    }

    /// Replace every parameter slot.
    ///
    /// All-or-nothing: if any binding fails, the previous slots are kept.
    /// Nothing is sent to the server.
    #[allow(clippy::result_large_err)]
    pub fn bind_params<I>(&mut self, bindings: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Binding>,
    {
        self.ensure_open()?;
        let slots = bind_all(bindings.into_iter().map(Into::into))?;
        if slots.len() != self.param_count {
            return Err(param_count_mismatch(self.param_count, slots.len()));
        }
        self.slots = slots;
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Bind every field of a record, in placeholder order.
    ///
    /// Same rules as [`Statement::bind_params`].
    #[allow(clippy::result_large_err)]
    pub fn bind_record<P: Params + ?Sized>(&mut self, record: &P) -> Result<()> {
        self.bind_params(record.bindings())
    }

    /// Bind a single parameter slot, leaving the others as they are.
    ///
    /// Unbound slots start out as NULL.
    #[allow(clippy::result_large_err)]
    pub fn bind_param(&mut self, index: usize, binding: impl Into<Binding>) -> Result<()> {
        self.ensure_open()?;
        if index >= self.param_count {
            return Err(invalid_index(index, self.param_count));
        }
        let slot = BoundParam::bind(binding.into()).map_err(|e| with_position(e, index))?;
        if self.slots.len() != self.param_count {
            self.slots = (0..self.param_count)
                .map(|_| BoundParam::bind(Binding::null()))
                .collect::<Result<_>>()?;
        }
        self.slots[index] = slot;
        self.state = StatementState::Bound;
        Ok(())
    }

    /// Execute the statement.
    ///
    /// Non-empty `values` are bound for this call only; otherwise the bound
    /// slots are used, re-reading by-reference bindings now.
    #[allow(clippy::result_large_err)]
    pub fn execute<'s, C: Connector>(
        &mut self,
        session: &'s mut Session<C>,
        values: &[ParamValue],
    ) -> Result<ResultSet<'s, C>> {
        self.ensure_current(session)?;
        let params = self.exec_params(values)?;

        session.send_command(Command::StmtExecute, &prepared::execute(self.id, &params))?;
        self.long_data.iter_mut().for_each(|flag| *flag = false);
        ResultSet::start(session, true)
    }

    /// Execute and collect the rows of the first result, discarding the rest.
    #[allow(clippy::result_large_err)]
    pub fn execute_all<C: Connector>(
        &mut self,
        session: &mut Session<C>,
        values: &[ParamValue],
    ) -> Result<Vec<Row>> {
        let mut result = self.execute(session, values)?;
        let rows = result.collect_rows()?;
        result.end()?;
        Ok(rows)
    }

    #[allow(clippy::result_large_err)]
    fn exec_params(&self, values: &[ParamValue]) -> Result<Vec<ExecParam>> {
        let resolved: Vec<(ParamValue, _)> = if values.is_empty() {
            if self.slots.len() != self.param_count {
                return Err(param_count_mismatch(self.param_count, self.slots.len()));
            }
            self.slots
                .iter()
                .enumerate()
                .map(|(i, slot)| slot.resolve().map_err(|e| with_position(e, i)))
                .collect::<Result<_>>()?
        } else {
            if values.len() != self.param_count {
                return Err(param_count_mismatch(self.param_count, values.len()));
            }
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    v.param_type()
                        .map(|t| (v.clone(), t))
                        .map_err(|e| with_position(e, i))
                })
                .collect::<Result<_>>()?
        };

        resolved
            .into_iter()
            .zip(&self.long_data)
            .enumerate()
            .map(|(i, ((value, param_type), &long_data))| {
                if !long_data {
                    return Ok(ExecParam {
                        value,
                        param_type,
                        long_data,
                    });
                }
                // An empty value is a slot for the streamed data; anything
                // else would compete with it.
                if !value.is_empty() {
                    return Err(Error::usage(
                        UsageErrorKind::LongDataConflict,
                        format!("parameter {} has long data and a bound value", i),
                    ));
                }
                Ok(ExecParam {
                    value: ParamValue::Null,
                    param_type,
                    long_data,
                })
            })
            .collect()
    }

    /// Stream a parameter value in chunks with COM_STMT_SEND_LONG_DATA.
    ///
    /// The server concatenates the chunks and uses them at the next execute,
    /// where the parameter's bound value must be NULL. Chunks larger than the
    /// session's packet limit allows are shrunk to fit.
    #[allow(clippy::result_large_err)]
    pub fn send_long_data<C: Connector, R: Read>(
        &mut self,
        session: &mut Session<C>,
        index: usize,
        mut source: R,
        chunk_size: usize,
    ) -> Result<()> {
        self.ensure_current(session)?;
        if index >= self.param_count {
            return Err(invalid_index(index, self.param_count));
        }
        let param_index = u16::try_from(index).map_err(|_| invalid_index(index, self.param_count))?;
        if chunk_size == 0 {
            return Err(Error::usage(
                UsageErrorKind::InvalidChunkSize,
                "long data chunk size must be greater than zero",
            ));
        }

        let max_chunk = session
            .max_packet_size()
            .saturating_sub(LONG_DATA_HEADER_SIZE)
            .max(1);
        let chunk_size = if chunk_size > max_chunk {
            tracing::warn!(
                requested = chunk_size,
                used = max_chunk,
                "long data chunk size exceeds max packet size; clamping"
            );
            max_chunk
        } else {
            chunk_size
        };

        let mut buf = Vec::with_capacity(chunk_size);
        loop {
            buf.clear();
            (&mut source)
                .take(chunk_size as u64)
                .read_to_end(&mut buf)?;
            if buf.is_empty() {
                break;
            }
            session.send_command(
                Command::StmtSendLongData,
                &prepared::send_long_data(self.id, param_index, &buf),
            )?;
            self.long_data[index] = true;
            if buf.len() < chunk_size {
                break;
            }
        }
        Ok(())
    }

    /// COM_STMT_RESET: drop long data accumulated on the server.
    #[allow(clippy::result_large_err)]
    pub fn reset<C: Connector>(&mut self, session: &mut Session<C>) -> Result<()> {
        self.ensure_current(session)?;
        session.send_command(Command::StmtReset, &prepared::reset(self.id))?;
        match session.read_result_header(false)? {
            ResultHeader::Ok(_) => {
                self.long_data.iter_mut().for_each(|flag| *flag = false);
                Ok(())
            }
            ResultHeader::Fields(_) => Err(session.protocol_failure(
                "COM_STMT_RESET returned a result set",
                &[],
            )),
        }
    }

    /// Deallocate the statement on the server. Closing twice is a no-op.
    ///
    /// A statement from an earlier connection, or on a session that can no
    /// longer talk to the server, is closed locally only.
    #[allow(clippy::result_large_err)]
    pub fn close<C: Connector>(&mut self, session: &mut Session<C>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        if session.epoch() == self.epoch && session.is_usable() {
            session.send_command(Command::StmtClose, &prepared::close(self.id))?;
            tracing::debug!(statement_id = self.id, "statement closed");
        }
        self.state = StatementState::Closed;
        self.slots.clear();
        Ok(())
    }
}

fn param_count_mismatch(expected: usize, actual: usize) -> Error {
    Error::usage(
        UsageErrorKind::ParamCountMismatch,
        format!("statement expects {} parameters, got {}", expected, actual),
    )
}

fn invalid_index(index: usize, count: usize) -> Error {
    Error::usage(
        UsageErrorKind::InvalidParamIndex,
        format!("parameter index {} out of range for {} parameters", index, count),
    )
}
